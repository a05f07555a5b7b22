//! Parameter resolver
//!
//! Merges the override layers of one (account, region) pair, most specific
//! layer first, and evaluates the intrinsic references of the values that
//! end up in the result.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use strata_core::Result;
use strata_core::domain::account::AccountDescriptor;
use strata_core::domain::parameters::{OverrideDocument, ResolvedParameters};

use super::intrinsic::IntrinsicResolver;

/// Service producing the final parameter document of an account and region
pub struct ParameterResolver {
    intrinsics: Arc<IntrinsicResolver>,
}

impl ParameterResolver {
    pub fn new(intrinsics: Arc<IntrinsicResolver>) -> Self {
        Self { intrinsics }
    }

    /// Merges `layers` (lowest precedence first) for one account and region
    ///
    /// `Parameters` and `Tags` are merged independently, per key. A key
    /// takes the value of the most specific layer defining it; a value that
    /// resolves to an empty string or null lets a less specific layer fill
    /// the key. Values shadowed by a more specific layer are never evaluated.
    pub async fn resolve_for(
        &self,
        account: &AccountDescriptor,
        region: &str,
        layers: &[OverrideDocument],
    ) -> Result<ResolvedParameters> {
        let parameters = self
            .merge(layers.iter().rev().map(|layer| &layer.parameters))
            .await?;
        let tags = self
            .merge(layers.iter().rev().map(|layer| &layer.tags))
            .await?;

        debug!(
            "Resolved {} parameter(s) and {} tag(s) for {} in {}",
            parameters.len(),
            tags.len(),
            account.name,
            region
        );

        Ok(ResolvedParameters {
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            region: region.to_string(),
            document: OverrideDocument { parameters, tags },
        })
    }

    /// Walks sections from the most specific to the least specific
    async fn merge<'a, I>(&self, sections: I) -> Result<BTreeMap<String, JsonValue>>
    where
        I: Iterator<Item = &'a BTreeMap<String, JsonValue>>,
    {
        let mut merged: BTreeMap<String, JsonValue> = BTreeMap::new();
        for section in sections {
            for (key, value) in section {
                if merged.get(key).is_some_and(|current| !is_blank(current)) {
                    continue;
                }
                let resolved = self.intrinsics.resolve_value(value).await?;
                if is_blank(&resolved) && merged.contains_key(key) {
                    continue;
                }
                merged.insert(key.clone(), resolved);
            }
        }
        Ok(merged)
    }
}

fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        _ => false,
    }
}
