//! `_routes.json` manifests shipped with static-site builds.
//!
//! Build tools list asset paths by caching class; each class becomes a set of
//! storage routes with a fixed priority. Server-rendered and function paths are
//! listed for completeness but need no route: the catch-all serves them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::lifecycle::StorageRoute;

const IMMUTABLE_PRIORITY: i32 = 3;
const STATIC_PRIORITY: i32 = 2;
const PRERENDERED_PRIORITY: i32 = 1;

/// Only a JSON object is a manifest; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoutesManifest {
    #[serde(default)]
    pub immutable: Vec<String>,
    #[serde(rename = "static", default)]
    pub static_routes: Vec<String>,
    #[serde(default)]
    pub prerendered: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub ssr: Vec<String>,
}

impl RoutesManifest {
    /// Parses manifest JSON.
    ///
    /// # Errors
    /// Returns the `serde_json` error for malformed or non-object input.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Expands the manifest into storage routes. A pattern listed in several
    /// classes takes the priority of the last class listing it, keeping its
    /// first position.
    #[must_use]
    pub fn storage_routes(&self) -> Vec<StorageRoute> {
        let classes = [
            (&self.immutable, IMMUTABLE_PRIORITY),
            (&self.static_routes, STATIC_PRIORITY),
            (&self.prerendered, PRERENDERED_PRIORITY),
        ];

        let mut routes: Vec<StorageRoute> = Vec::new();
        for (patterns, priority) in classes {
            for pattern in patterns {
                match routes.iter_mut().find(|route| route.pattern == *pattern) {
                    Some(route) => route.priority = priority,
                    None => routes.push(StorageRoute {
                        pattern: pattern.clone(),
                        priority,
                    }),
                }
            }
        }
        routes
    }
}

impl<'de> Deserialize<'de> for RoutesManifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut object = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self {
            immutable: take_class(&mut object, "immutable")?,
            static_routes: take_class(&mut object, "static")?,
            prerendered: take_class(&mut object, "prerendered")?,
            functions: take_class(&mut object, "functions")?,
            ssr: take_class(&mut object, "ssr")?,
        })
    }
}

fn take_class<E: serde::de::Error>(
    object: &mut Map<String, Value>,
    key: &'static str,
) -> Result<Vec<String>, E> {
    match object.remove(key) {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|err| E::custom(format_args!("routes manifest `{key}`: {err}"))),
    }
}
