use std::collections::HashMap;

use crate::models::NewsItem;

/// Company names used by Russian-language headlines for the most traded tickers
static TICKER_NAMES: &[(&str, &[&str])] = &[
    ("SBER", &["Сбербанк", "Сбер"]),
    ("GAZP", &["Газпром"]),
    ("LKOH", &["Лукойл", "ЛУКОЙЛ"]),
    ("GMKN", &["Норникель", "Норильский никель"]),
    ("NVTK", &["Новатэк", "НОВАТЭК"]),
    ("ROSN", &["Роснефть"]),
    ("YNDX", &["Яндекс"]),
    ("TCSG", &["Тинькофф", "Т-Банк", "TCS"]),
    ("MTSS", &["МТС"]),
    ("MGNT", &["Магнит"]),
    ("PLZL", &["Полюс"]),
    ("CHMF", &["Северсталь"]),
    ("ALRS", &["Алроса", "АЛРОСА"]),
    ("SNGS", &["Сургутнефтегаз"]),
    ("VTBR", &["ВТБ"]),
    ("MOEX", &["Мосбиржа", "Московская биржа"]),
    ("TATN", &["Татнефть"]),
    ("NLMK", &["НЛМК"]),
    ("PHOR", &["ФосАгро"]),
    ("IRAO", &["Интер РАО"]),
];

/// Group headlines by the tickers they mention
///
/// A headline matches when it contains the ticker symbol or one of the known
/// company names, compared case-insensitively. One item may match several
/// tickers. Tickers without matches are absent from the map.
pub fn news_for_tickers(news: &[NewsItem], tickers: &[String]) -> HashMap<String, Vec<NewsItem>> {
    let titles: Vec<String> = news.iter().map(|n| n.title.to_uppercase()).collect();
    let mut result: HashMap<String, Vec<NewsItem>> = HashMap::new();

    for ticker in tickers {
        let mut terms = vec![ticker.to_uppercase()];
        if let Some((_, names)) = TICKER_NAMES.iter().find(|(t, _)| *t == ticker.as_str()) {
            terms.extend(names.iter().map(|n| n.to_uppercase()));
        }

        for (item, title) in news.iter().zip(&titles) {
            if terms.iter().any(|term| title.contains(term.as_str())) {
                result.entry(ticker.clone()).or_default().push(item.clone());
            }
        }
    }

    result
}
