//! Route definitions.

use serde::{Deserialize, Serialize};

/// An ordered chain of script stages applied to messages submitted under a
/// given route id. All fields hold script identifiers resolved against the
/// registry at run start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Decoder for raw byte payloads. Required when the route receives
    /// bytes, unused for key-value payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
    /// Filter scripts, run in order; the first `false` drops the message.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Transform scripts, chained in order.
    #[serde(default)]
    pub transforms: Vec<String>,
    /// Enrichment transforms, chained after the transforms.
    #[serde(default)]
    pub enrichers: Vec<String>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder(mut self, id: impl Into<String>) -> Self {
        self.decoder = Some(id.into());
        self
    }

    pub fn with_filter(mut self, id: impl Into<String>) -> Self {
        self.filters.push(id.into());
        self
    }

    pub fn with_transform(mut self, id: impl Into<String>) -> Self {
        self.transforms.push(id.into());
        self
    }

    pub fn with_enricher(mut self, id: impl Into<String>) -> Self {
        self.enrichers.push(id.into());
        self
    }

    /// All script ids referenced by this route.
    pub fn script_ids(&self) -> impl Iterator<Item = &String> {
        self.decoder
            .iter()
            .chain(&self.filters)
            .chain(&self.transforms)
            .chain(&self.enrichers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_ids_in_stage_order() {
        let route = Route::new()
            .with_decoder("dec")
            .with_filter("f1")
            .with_filter("f2")
            .with_transform("t1")
            .with_enricher("e1");

        let ids: Vec<&str> = route.script_ids().map(String::as_str).collect();
        assert_eq!(ids, vec!["dec", "f1", "f2", "t1", "e1"]);
    }

    #[test]
    fn empty_fields_omitted_from_json() {
        let json = serde_json::to_string(&Route::new().with_filter("f")).unwrap();
        assert!(!json.contains("decoder"));

        let back: Route = serde_json::from_str(r#"{"filters":["f"]}"#).unwrap();
        assert_eq!(back.filters, vec!["f".to_string()]);
        assert!(back.decoder.is_none());
    }
}
