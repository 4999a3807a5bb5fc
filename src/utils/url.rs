//! URL utilities for query rewriting and player script locations

use crate::error::SliceError;
use regex::Regex;
use url::Url;

/// Read the first value of a query parameter
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// Set a query parameter the way `URLSearchParams.set` does: the first
/// occurrence is replaced in place, later duplicates are dropped, and a
/// missing parameter is appended.
pub fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let mut replaced = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter_map(|(name, current)| {
            if name != key {
                return Some((name, current));
            }
            if replaced {
                return None;
            }
            replaced = true;
            Some((name, value.to_string()))
        })
        .collect();

    let mut query = url.query_pairs_mut();
    query.clear().extend_pairs(&pairs);
    if !replaced {
        query.append_pair(key, value);
    }
}

/// Extract the player id from an iframe API payload or a player script URL
pub fn player_version_from_text(text: &str) -> Result<Option<String>, SliceError> {
    let player_regex = Regex::new(r"player\\?/([a-zA-Z0-9_-]+)\\?/")?;
    Ok(player_regex
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string()))
}

/// Canonical script URL for a player id
pub fn player_script_url(player_id: &str) -> String {
    format!(
        "https://www.youtube.com/s/player/{}/player_ias.vflset/en_US/base.js",
        player_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        let url = Url::parse("https://example.com/videoplayback?itag=18&n=abc&n=def").unwrap();
        assert_eq!(query_param(&url, "n"), Some("abc".to_string()));
        assert_eq!(query_param(&url, "sig"), None);
    }

    #[test]
    fn test_set_query_param_replaces_in_place() {
        let mut url = Url::parse("https://example.com/videoplayback?n=abc&itag=18&n=zzz").unwrap();
        set_query_param(&mut url, "n", "cba");
        assert_eq!(url.as_str(), "https://example.com/videoplayback?n=cba&itag=18");
    }

    #[test]
    fn test_set_query_param_appends() {
        let mut url = Url::parse("https://example.com/videoplayback?itag=18").unwrap();
        set_query_param(&mut url, "signature", "a b/c");
        assert_eq!(
            url.as_str(),
            "https://example.com/videoplayback?itag=18&signature=a+b%2Fc"
        );
        assert_eq!(query_param(&url, "signature"), Some("a b/c".to_string()));
    }

    #[test]
    fn test_player_version_from_text() {
        let payload = r#"var scriptUrl = 'https:\/\/www.youtube.com\/s\/player\/3d3ba064\/www-widgetapi.vflset\/www-widgetapi.js';"#;
        assert_eq!(
            player_version_from_text(payload).unwrap(),
            Some("3d3ba064".to_string())
        );
        assert_eq!(
            player_version_from_text("/s/player/a1b2_c-3/player_ias.vflset/en_US/base.js").unwrap(),
            Some("a1b2_c-3".to_string())
        );
        assert_eq!(player_version_from_text("no player here").unwrap(), None);
    }

    #[test]
    fn test_player_script_url() {
        assert_eq!(
            player_script_url("3d3ba064"),
            "https://www.youtube.com/s/player/3d3ba064/player_ias.vflset/en_US/base.js"
        );
    }
}
