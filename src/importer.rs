use crate::errors::{AppError, AppResult};
use crate::models::MetricsUpdate;
use csv::ReaderBuilder;

// Vendor exports rename columns between app versions; each field is looked
// up under every known header, first match wins.
const VIEWS_COLUMNS: [&str; 3] = ["Video views", "Views", "views"];
const LIKES_COLUMNS: [&str; 2] = ["Likes", "likes"];
const COMMENTS_COLUMNS: [&str; 2] = ["Comments", "comments"];
const SHARES_COLUMNS: [&str; 2] = ["Shares", "shares"];
const FAVORITES_COLUMNS: [&str; 2] = ["Favorites", "favorites"];
const AVG_WATCH_COLUMNS: [&str; 2] = ["Average time watched(Seconds)", "Average watch time"];
const FULL_RATE_COLUMNS: [&str; 2] = ["Watched full video(%)", "Watched full video"];
const URL_COLUMNS: [&str; 3] = ["Video link", "URL", "url"];

/// One analytics export row, mapped to our metrics shape. Rows without a
/// usable URL can never match a script and carry `url: None`.
#[derive(Debug, Clone)]
pub struct MetricsRow {
    pub url: Option<String>,
    pub update: MetricsUpdate,
}

pub fn parse_metrics_csv(bytes: &[u8]) -> AppResult<Vec<MetricsRow>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|err| AppError::Validation(format!("unreadable CSV header: {err}")))?
        .clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result
            .map_err(|err| AppError::Validation(format!("unreadable CSV row: {err}")))?;
        let field = |names: &[&str]| -> Option<String> {
            names.iter().find_map(|name| {
                headers
                    .iter()
                    .position(|header| header == *name)
                    .and_then(|idx| record.get(idx))
                    .filter(|value| !value.is_empty())
                    .map(ToString::to_string)
            })
        };

        let count = |names: &[&str]| -> i64 {
            field(names)
                .and_then(|value| value.replace(',', "").parse::<i64>().ok())
                .unwrap_or(0)
        };
        let rate = |names: &[&str]| -> Option<f64> {
            field(names).and_then(|value| value.trim_end_matches('%').parse::<f64>().ok())
        };

        rows.push(MetricsRow {
            url: field(&URL_COLUMNS),
            update: MetricsUpdate {
                views: count(&VIEWS_COLUMNS),
                likes: count(&LIKES_COLUMNS),
                comments: count(&COMMENTS_COLUMNS),
                shares: count(&SHARES_COLUMNS),
                favorites: Some(count(&FAVORITES_COLUMNS)),
                avg_watch_time: rate(&AVG_WATCH_COLUMNS),
                full_watch_rate: rate(&FULL_RATE_COLUMNS),
            },
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::parse_metrics_csv;

    #[test]
    fn maps_vendor_headers_and_defaults() {
        let csv = "Video views,Likes,Comments,Shares,Video link\n\
                   12000,450,23,12,https://example.com/v/9\n";
        let rows = parse_metrics_csv(csv.as_bytes()).expect("parse");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].update.views, 12000);
        assert_eq!(rows[0].update.likes, 450);
        assert_eq!(rows[0].update.favorites, Some(0));
        assert_eq!(rows[0].update.avg_watch_time, None);
        assert_eq!(rows[0].url.as_deref(), Some("https://example.com/v/9"));
    }

    #[test]
    fn first_matching_column_wins() {
        let csv = "Video views,views,url\n100,999,https://example.com/v/1\n";
        let rows = parse_metrics_csv(csv.as_bytes()).expect("parse");
        assert_eq!(rows[0].update.views, 100);
    }

    #[test]
    fn lowercase_fallback_headers_are_accepted() {
        let csv = "views,likes,url,Watched full video(%)\n500,10,https://example.com/v/2,38.5\n";
        let rows = parse_metrics_csv(csv.as_bytes()).expect("parse");
        assert_eq!(rows[0].update.views, 500);
        assert_eq!(rows[0].update.full_watch_rate, Some(38.5));
    }

    #[test]
    fn row_without_url_column_is_kept_but_unmatchable() {
        let csv = "Views,Likes\n300,5\n";
        let rows = parse_metrics_csv(csv.as_bytes()).expect("parse");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].url.is_none());
    }

    #[test]
    fn thousands_separators_in_counts_parse() {
        let csv = "Views,url\n\"1,200,300\",https://example.com/v/3\n";
        let rows = parse_metrics_csv(csv.as_bytes()).expect("parse");
        assert_eq!(rows[0].update.views, 1_200_300);
    }
}
