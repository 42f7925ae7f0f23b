//! Parsing of `key:value,key:value` style config items, e.g. `MAPPINGS=kitchen:Kitchen,garage`.

use std::collections::HashMap;

use serde::de::{Deserialize, Deserializer};

const KV_SEP_DEFAULT: &str = ":";
const ITEM_SEP_DEFAULT: &str = ",";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvMapParser {
    kv_sep: String,
    item_sep: String,
}

impl Default for KvMapParser {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl KvMapParser {
    /// Empty separators fall back to `:` and `,`.
    pub fn new(kv_sep: &str, item_sep: &str) -> Self {
        let kv_sep = if kv_sep.is_empty() { KV_SEP_DEFAULT } else { kv_sep };
        let item_sep = if item_sep.is_empty() { ITEM_SEP_DEFAULT } else { item_sep };
        Self { kv_sep: kv_sep.into(), item_sep: item_sep.into() }
    }

    /// A piece without a key-value separator maps to an empty value.
    pub fn parse(&self, v: &str) -> HashMap<String, String> {
        v.split(self.item_sep.as_str())
            .filter(|item| !item.is_empty())
            .map(|item| {
                let mut parts = item.split(self.kv_sep.as_str());
                let key = parts.next().unwrap_or_default();
                let value = parts.next().unwrap_or_default();
                (key.to_owned(), value.to_owned())
            })
            .collect()
    }
}

/// Deserialize a map from a string using the default separators
#[inline]
pub fn deserialize_kv_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    Ok(KvMapParser::default().parse(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(items: &[(&str, &str)]) -> HashMap<String, String> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse() {
        let cases = [
            ("", "", "a:1,b:2", map(&[("a", "1"), ("b", "2")])),
            ("", "", "a:1,b", map(&[("a", "1"), ("b", "")])),
            ("=", ";", "a=1;b=2", map(&[("a", "1"), ("b", "2")])),
            ("", "", "a:1:2", map(&[("a", "1")])),
            ("", "", "", map(&[])),
        ];
        for (kv, item, input, expected) in cases {
            assert_eq!(KvMapParser::new(kv, item).parse(input), expected, "input: {:?}", input);
        }
    }

    #[test]
    fn test_deserialize() {
        #[derive(serde::Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "deserialize_kv_map")]
            mappings: HashMap<String, String>,
        }
        let h: Holder = serde_json::from_str(r#"{"mappings":"kitchen:Kitchen,garage"}"#).unwrap();
        assert_eq!(h.mappings, map(&[("kitchen", "Kitchen"), ("garage", "")]));
    }
}
