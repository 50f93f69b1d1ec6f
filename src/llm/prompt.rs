use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{InstrumentSnapshot, NewsItem, PortfolioInfo, PositionInfo};

pub const SYSTEM_PROMPT: &str = r#"Ты — опытный трейдер на российском фондовом рынке (MOEX).
Анализируй рыночные данные (динамика цен, объёмы, новости) и текущий портфель.
Принимай решения: BUY (покупка), SELL (закрытие позиции) или HOLD (удержание).
Горизонт сделок — от нескольких часов до 2 дней.

Тебе предоставлены:
- Топ-50 ликвидных акций TQBR с ценами, процентами изменения за 3ч/1д/3д/1нед и объёмами за 24ч
- Новости MOEX за последние 24ч, отфильтрованные по тикерам
- Текущий портфель с открытыми позициями

Правила:
1. Анализируй динамику цен (3ч, 1д, 3д, 1нед), объёмы и новости для каждого тикера.
2. Не покупай, если позиция по тикеру уже открыта.
3. Для BUY указывай stop_loss и take_profit (уровни цены) и current_price (текущая цена).
4. Для SELL укажи причину закрытия в reasoning.
5. Confidence от 0 до 100 — чем выше, тем увереннее в решении.
6. Учитывай риск-менеджмент: не более 10% портфеля на одну позицию.
7. Ищи тикеры с сильной краткосрочной динамикой, подтверждённой объёмом и/или новостным фоном.
8. Учитывай открытые позиции — если тренд развернулся, рекомендуй SELL.

Ответ строго в JSON (массив объектов):
[
  {
    "action": "BUY",
    "ticker": "SBER",
    "current_price": 265.0,
    "stop_loss": 250.0,
    "take_profit": 290.0,
    "confidence": 75,
    "reasoning": "Причина решения"
  }
]

Если нет хороших возможностей — верни пустой массив []."#;

/// Per-ticker row of the market table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerAnalysis {
    pub ticker: String,
    pub last_price: f64,
    pub volume_24h: f64,
    pub change_3h: f64, // percent
    pub change_1d: f64,
    pub change_3d: f64,
    pub change_1w: f64,
    pub news: Vec<String>, // headlines
}

impl TickerAnalysis {
    pub fn from_snapshot(snapshot: &InstrumentSnapshot, news: &[NewsItem]) -> Self {
        Self {
            ticker: snapshot.ticker.clone(),
            last_price: snapshot.last_price,
            volume_24h: snapshot.volume_24h,
            change_3h: pct_change(snapshot.last_price, snapshot.price_3h_ago),
            change_1d: pct_change(snapshot.last_price, snapshot.price_1d_ago),
            change_3d: pct_change(snapshot.last_price, snapshot.price_3d_ago),
            change_1w: pct_change(snapshot.last_price, snapshot.price_1w_ago),
            news: news.iter().map(|n| n.title.clone()).collect(),
        }
    }
}

/// Everything the model sees for one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisRequest {
    pub tickers: Vec<TickerAnalysis>,
    pub positions: Vec<PositionInfo>,
    pub available_rub: f64,
    pub total_rub: f64,
}

impl AnalysisRequest {
    pub fn build(
        snapshots: &[InstrumentSnapshot],
        news_by_ticker: &HashMap<String, Vec<NewsItem>>,
        portfolio: &PortfolioInfo,
    ) -> Self {
        let tickers = snapshots
            .iter()
            .map(|s| {
                let news = news_by_ticker
                    .get(&s.ticker)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                TickerAnalysis::from_snapshot(s, news)
            })
            .collect();

        Self {
            tickers,
            positions: portfolio.positions.clone(),
            available_rub: portfolio.available_rub,
            total_rub: portfolio.total_rub,
        }
    }
}

/// Percentage move from `base` to `current`; zero when there is no base
pub fn pct_change(current: f64, base: f64) -> f64 {
    if base == 0.0 {
        return 0.0;
    }
    (current - base) / base * 100.0
}

pub fn build_user_prompt(req: &AnalysisRequest) -> String {
    let mut sb = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(sb, "## Текущий портфель");
    let _ = writeln!(
        sb,
        "Общий баланс: {:.2} ₽ / Доступно: {:.2} ₽\n",
        req.total_rub, req.available_rub
    );

    if req.positions.is_empty() {
        let _ = writeln!(sb, "Открытых позиций нет.\n");
    } else {
        let _ = writeln!(sb, "### Открытые позиции");
        for p in &req.positions {
            let _ = writeln!(
                sb,
                "- {}: {:.0} шт, ср.цена {:.2}, текущая {:.2}, P&L {:.2}",
                p.ticker, p.quantity, p.avg_price, p.current_price, p.pnl
            );
        }
        sb.push('\n');
    }

    let _ = writeln!(sb, "## Рыночные данные (топ-{} по объёму, TQBR)", req.tickers.len());
    let _ = writeln!(sb, "| Тикер | Цена | 3ч% | 1д% | 3д% | 1нед% | Объём24ч |");
    let _ = writeln!(sb, "|-------|------|-----|-----|-----|-------|----------|");
    for t in &req.tickers {
        let _ = writeln!(
            sb,
            "| {} | {:.2} | {:+.1} | {:+.1} | {:+.1} | {:+.1} | {:.0} |",
            t.ticker, t.last_price, t.change_3h, t.change_1d, t.change_3d, t.change_1w, t.volume_24h
        );
    }
    sb.push('\n');

    let with_news: Vec<&TickerAnalysis> = req.tickers.iter().filter(|t| !t.news.is_empty()).collect();
    let _ = writeln!(sb, "## Новости за 24ч");
    if with_news.is_empty() {
        let _ = writeln!(sb, "Релевантных новостей не найдено.");
    }
    for t in with_news {
        let _ = writeln!(sb, "### {}", t.ticker);
        for headline in &t.news {
            let _ = writeln!(sb, "- {}", headline);
        }
    }

    sb.push_str("\nПроанализируй и выдай решения в JSON.");
    sb
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(110.0, 100.0), 10.0);
        assert_eq!(pct_change(90.0, 100.0), -10.0);
        assert_eq!(pct_change(90.0, 0.0), 0.0);
    }

    #[test]
    fn test_request_attaches_news_and_changes() {
        let snapshots = vec![InstrumentSnapshot {
            ticker: "SBER".to_string(),
            instrument_id: "uid-sber".to_string(),
            last_price: 110.0,
            price_3h_ago: 100.0,
            price_1d_ago: 0.0,
            price_3d_ago: 110.0,
            price_1w_ago: 220.0,
            volume_24h: 5000.0,
        }];
        let mut news = HashMap::new();
        news.insert(
            "SBER".to_string(),
            vec![NewsItem {
                id: 1,
                title: "Сбербанк отчитался".to_string(),
                published: Utc::now(),
            }],
        );
        let portfolio = PortfolioInfo {
            total_rub: 100_000.0,
            available_rub: 40_000.0,
            positions: vec![],
        };

        let req = AnalysisRequest::build(&snapshots, &news, &portfolio);
        let t = &req.tickers[0];
        assert_eq!(t.change_3h, 10.0);
        assert_eq!(t.change_1d, 0.0);
        assert_eq!(t.change_3d, 0.0);
        assert_eq!(t.change_1w, -50.0);
        assert_eq!(t.news, vec!["Сбербанк отчитался".to_string()]);
        assert_eq!(req.available_rub, 40_000.0);
    }

    #[test]
    fn test_user_prompt_layout() {
        let req = AnalysisRequest {
            tickers: vec![TickerAnalysis {
                ticker: "GAZP".to_string(),
                last_price: 160.5,
                volume_24h: 1234.4,
                change_3h: 1.26,
                change_1d: -0.5,
                ..Default::default()
            }],
            positions: vec![PositionInfo {
                ticker: "LKOH".to_string(),
                quantity: 2.0,
                avg_price: 7000.0,
                current_price: 7100.0,
                pnl: 200.0,
                ..Default::default()
            }],
            available_rub: 5000.0,
            total_rub: 19_200.0,
        };

        let prompt = build_user_prompt(&req);
        assert!(prompt.contains("Общий баланс: 19200.00 ₽ / Доступно: 5000.00 ₽"));
        assert!(prompt.contains("- LKOH: 2 шт, ср.цена 7000.00, текущая 7100.00, P&L 200.00"));
        assert!(prompt.contains("| GAZP | 160.50 | +1.3 | -0.5 | +0.0 | +0.0 | 1234 |"));
        assert!(prompt.contains("Релевантных новостей не найдено."));
        assert!(prompt.ends_with("Проанализируй и выдай решения в JSON."));
    }
}
