// Operator notifications
pub mod telegram;

use async_trait::async_trait;

pub use telegram::TelegramNotifier;

/// Outbound operator channel. Delivery failures are logged by the
/// implementation and never reach the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_buy(&self, ticker: &str, price: f64, lots: i64, stop_loss: f64, take_profit: f64);

    async fn notify_sell(&self, ticker: &str, price: f64, lots: i64, pnl: f64);

    async fn notify_error(&self, context: &str, error: &str);

    async fn notify_status(&self, message: &str);
}

pub fn format_buy(ticker: &str, price: f64, lots: i64, stop_loss: f64, take_profit: f64) -> String {
    format!(
        "🟢 BUY {}\nЦена: {:.2} ₽\nЛотов: {}\nStop-loss: {:.2} ₽\nTake-profit: {:.2} ₽",
        ticker, price, lots, stop_loss, take_profit
    )
}

pub fn format_sell(ticker: &str, price: f64, lots: i64, pnl: f64) -> String {
    let emoji = if pnl >= 0.0 { "💰" } else { "🔻" };
    format!(
        "🔴 SELL {}\nЦена: {:.2} ₽\nЛотов: {}\n{} P&L: {:+.2} ₽",
        ticker, price, lots, emoji, pnl
    )
}

pub fn format_error(context: &str, error: &str) -> String {
    format!("⚠️ Ошибка: {}\n{}", context, error)
}

/// Records every message instead of sending it
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    messages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.messages().iter().filter(|m| m.starts_with(prefix)).count()
    }

    fn push(&self, message: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_buy(&self, ticker: &str, price: f64, lots: i64, stop_loss: f64, take_profit: f64) {
        self.push(format_buy(ticker, price, lots, stop_loss, take_profit));
    }

    async fn notify_sell(&self, ticker: &str, price: f64, lots: i64, pnl: f64) {
        self.push(format_sell(ticker, price, lots, pnl));
    }

    async fn notify_error(&self, context: &str, error: &str) {
        self.push(format_error(context, error));
    }

    async fn notify_status(&self, message: &str) {
        self.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sell_sign() {
        assert!(format_sell("SBER", 112.5, 10, 125.0).contains("P&L: +125.00"));
        assert!(format_sell("SBER", 90.0, 10, -100.0).contains("🔻 P&L: -100.00"));
    }

    #[test]
    fn test_format_buy_levels() {
        let text = format_buy("SBER", 238.1, 42, 250.0, 290.0);
        assert!(text.starts_with("🟢 BUY SBER"));
        assert!(text.contains("Лотов: 42"));
        assert!(text.contains("Stop-loss: 250.00"));
    }
}
