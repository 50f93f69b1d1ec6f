use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::quotation::{MoneyValue, Quotation};
use super::tinkoff::TinkoffClient;
use super::BrokerError;

/// Portfolio payload shared by the live and sandbox endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResponse {
    #[serde(default)]
    pub total_amount_portfolio: MoneyValue,
    #[serde(default)]
    pub total_amount_currencies: MoneyValue,
    #[serde(default)]
    pub positions: Vec<PortfolioPosition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub instrument_type: String,
    #[serde(default)]
    pub instrument_uid: String,
    #[serde(default)]
    pub quantity: Quotation,
    #[serde(default)]
    pub quantity_lots: Quotation,
    #[serde(default)]
    pub average_position_price: MoneyValue,
    #[serde(default)]
    pub current_price: MoneyValue,
    #[serde(default)]
    pub expected_yield: Quotation,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PortfolioRequest<'a> {
    account_id: &'a str,
    currency: &'static str,
}

/// Where account state is read from
///
/// Live and sandbox accounts expose the same payload under different
/// service methods.
#[async_trait]
pub trait PortfolioProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        client: &TinkoffClient,
        account_id: &str,
    ) -> Result<PortfolioResponse, BrokerError>;
}

pub struct LivePortfolio;

#[async_trait]
impl PortfolioProvider for LivePortfolio {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn fetch(
        &self,
        client: &TinkoffClient,
        account_id: &str,
    ) -> Result<PortfolioResponse, BrokerError> {
        client
            .post(
                "tinkoff.public.invest.api.contract.v1.OperationsService/GetPortfolio",
                &PortfolioRequest {
                    account_id,
                    currency: "RUB",
                },
            )
            .await
    }
}

pub struct SandboxPortfolio;

#[async_trait]
impl PortfolioProvider for SandboxPortfolio {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn fetch(
        &self,
        client: &TinkoffClient,
        account_id: &str,
    ) -> Result<PortfolioResponse, BrokerError> {
        client
            .post(
                "tinkoff.public.invest.api.contract.v1.SandboxService/GetSandboxPortfolio",
                &PortfolioRequest {
                    account_id,
                    currency: "RUB",
                },
            )
            .await
    }
}

impl PortfolioPosition {
    /// Cash balances show up as positions too
    pub fn is_currency(&self) -> bool {
        self.instrument_type.eq_ignore_ascii_case("currency")
    }
}
