// src/ingest/providers/scraped.rs
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::candidate::DayMonth;
use crate::config::bot::{NetSection, SiteConfig};
use crate::ingest::normalize_text;
use crate::ingest::types::{RawCandidate, SourceError, SourceProvider};
use crate::net::{with_retries, RetryPolicy};

/// `1492 – texto`, `1492: texto`, `Año 1492. texto`, `218 a. C.: texto`.
static LEADING_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:año\s+)?(\d{1,4})(\s*a\.\s*c\.)?\s*[–—:.\-]\s*(.+)$").unwrap()
});

struct Site {
    name: String,
    url_template: String,
    selector: Selector,
}

/// Scrapes per-day history pages. Each configured site is tried; the
/// provider only fails when every site fails.
pub struct ScrapeProvider {
    http: reqwest::Client,
    sites: Vec<Site>,
    retry: RetryPolicy,
}

impl ScrapeProvider {
    pub fn new(sites: &[SiteConfig], net: &NetSection) -> anyhow::Result<Self> {
        let sites = sites
            .iter()
            .map(|s| {
                let selector = Selector::parse(&s.item_selector).map_err(|e| {
                    anyhow::anyhow!("site {}: invalid selector {:?}: {e}", s.name, s.item_selector)
                })?;
                Ok(Site {
                    name: s.name.clone(),
                    url_template: s.url_template.clone(),
                    selector,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            http: crate::net::http_client(net.timeout())?,
            sites,
            retry: net.retry_policy(),
        })
    }

    async fn get_page(&self, url: &str) -> Result<String, SourceError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                provider: "scrape",
                status,
            });
        }
        Ok(resp.text().await?)
    }
}

/// Fill `{day}`, `{dd}`, `{month}` and `{month_name}` in a site URL template.
pub fn expand_url(template: &str, today: DayMonth) -> String {
    template
        .replace("{day}", &today.day.to_string())
        .replace("{dd}", &format!("{:02}", today.day))
        .replace("{month_name}", today.month_name_es())
        .replace("{month}", &format!("{:02}", today.month))
}

/// Split a list entry into (year, text). Entries without a leading year are ignored.
pub fn parse_leading_year(entry: &str) -> Option<(i32, String)> {
    let caps = LEADING_YEAR.captures(entry.trim())?;
    let year: i32 = caps[1].parse().ok()?;
    if year == 0 {
        return None;
    }
    let year = if caps.get(2).is_some() { -year } else { year };
    let text = caps[3].trim();
    if text.is_empty() {
        return None;
    }
    Some((year, text.to_string()))
}

/// Extract dated entries from an HTML document.
pub fn parse_items(site: &str, html: &str, selector: &Selector) -> Vec<RawCandidate> {
    let doc = Html::parse_document(html);
    doc.select(selector)
        .filter_map(|el| {
            let text = normalize_text(&el.text().collect::<String>());
            let (year, text) = parse_leading_year(&text)?;
            Some(RawCandidate::Scraped {
                site: site.to_string(),
                year,
                text,
            })
        })
        .collect()
}

#[async_trait]
impl SourceProvider for ScrapeProvider {
    async fn fetch(&self, today: DayMonth) -> Result<Vec<RawCandidate>, SourceError> {
        let mut out = Vec::new();
        let mut last_err = None;
        for site in &self.sites {
            let url = expand_url(&site.url_template, today);
            match with_retries(self.retry, "scrape", || self.get_page(&url)).await {
                Ok(html) => {
                    let items = parse_items(&site.name, &html, &site.selector);
                    tracing::debug!(target: "ingest", site = %site.name, count = items.len(), "site scraped");
                    out.extend(items);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", site = %site.name, error = %e, "site failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if out.is_empty() => Err(e),
            _ => Ok(out),
        }
    }

    fn name(&self) -> &'static str {
        "scrape"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_template_placeholders() {
        let dm = DayMonth::new(7, 10).unwrap();
        assert_eq!(
            expand_url("https://es.wikipedia.org/wiki/{day}_de_{month_name}", dm),
            "https://es.wikipedia.org/wiki/7_de_octubre"
        );
        assert_eq!(expand_url("/hoy/{dd}-{month}", dm), "/hoy/07-10");
    }

    #[test]
    fn leading_year_forms() {
        assert_eq!(
            parse_leading_year("1492 – Colón llega a Guanahaní"),
            Some((1492, "Colón llega a Guanahaní".into()))
        );
        assert_eq!(
            parse_leading_year("1571: batalla de Lepanto"),
            Some((1571, "batalla de Lepanto".into()))
        );
        assert_eq!(
            parse_leading_year("Año 1808. Levantamiento en Madrid"),
            Some((1808, "Levantamiento en Madrid".into()))
        );
        assert_eq!(
            parse_leading_year("218 a. C.: desembarco romano en Ampurias"),
            Some((-218, "desembarco romano en Ampurias".into()))
        );
        assert_eq!(parse_leading_year("Sin año conocido"), None);
        assert_eq!(parse_leading_year("1492 –"), None);
    }

    #[test]
    fn items_are_extracted_with_selector() {
        let html = r#"<html><body><div id="mw-content-text">
            <h2>Acontecimientos</h2>
            <ul>
              <li><a href="/wiki/1571">1571</a>: en el golfo de Lepanto, la Santa Liga derrota a la flota otomana.</li>
              <li>Sin fecha</li>
              <li><a href="/wiki/1805">1805</a> &ndash; Batalla de Trafalgar.<sup>[1]</sup></li>
            </ul></div></body></html>"#;
        let sel = Selector::parse("#mw-content-text ul > li").unwrap();
        let items = parse_items("wiki", html, &sel);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1],
            RawCandidate::Scraped {
                site: "wiki".into(),
                year: 1805,
                text: "Batalla de Trafalgar.".into()
            }
        );
    }
}
