//! Request and response bodies of the HTTP API.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    model::{CodeType, DomainTarget},
    plane::{Deploy, FunctionWorkerSpec, PlaneError, RoutesManifest, StorageRoute},
    resolver::Identity,
};

fn root_path() -> String {
    "/".to_string()
}

/// Error payload returned by control-plane endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    pub worker_id: Option<Uuid>,
    pub subdomain: Option<String>,
    pub domain: Option<String>,
    /// Raw `Host` header; only used when no explicit identity is given.
    pub host: Option<String>,
    #[serde(default = "root_path")]
    pub path: String,
}

impl ResolveRequest {
    #[must_use]
    pub fn identity(&self, platform_domain: &str) -> Identity {
        let explicit = Identity {
            worker_id: self.worker_id,
            subdomain: self.subdomain.clone(),
            domain: self.domain.clone(),
        };
        match self.host.as_deref() {
            Some(host) if explicit == Identity::default() => {
                Identity::from_host(host, platform_domain)
            }
            _ => explicit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AmbiguousRouteBody {
    pub error: String,
    pub project_id: Uuid,
    pub patterns: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEnvironmentRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkerRequest {
    pub name: String,
    pub environment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub name: String,
    pub environment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkEnvironmentRequest {
    /// `null` unlinks the environment.
    pub environment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDomainRequest {
    pub name: String,
    pub target: DomainTarget,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FunctionRequest {
    pub pattern: String,
    /// Base64-encoded source or module.
    pub code: String,
    #[serde(default)]
    pub code_type: CodeType,
}

/// A deploy carries either explicit storage `routes` or a `_routes.json`
/// `manifest`, not both.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeployRequest {
    /// Base64-encoded source or module.
    pub code: String,
    #[serde(default)]
    pub code_type: CodeType,
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<StorageRoute>,
    pub manifest: Option<RoutesManifest>,
    #[serde(default)]
    pub functions: Vec<FunctionRequest>,
}

fn decode_code(encoded: &str) -> Result<Vec<u8>, PlaneError> {
    Base64::decode_vec(encoded.trim())
        .map_err(|_| PlaneError::InvalidInput("code must be standard base64"))
}

impl TryFrom<DeployRequest> for Deploy {
    type Error = PlaneError;

    fn try_from(request: DeployRequest) -> Result<Self, Self::Error> {
        let storage_routes = match request.manifest {
            Some(_) if !request.routes.is_empty() => {
                return Err(PlaneError::InvalidInput(
                    "send either routes or a manifest, not both",
                ));
            }
            Some(manifest) => manifest.storage_routes(),
            None => request.routes,
        };

        let functions = request
            .functions
            .into_iter()
            .map(|function| {
                Ok(FunctionWorkerSpec {
                    code: decode_code(&function.code)?,
                    pattern: function.pattern,
                    code_type: function.code_type,
                })
            })
            .collect::<Result<Vec<_>, PlaneError>>()?;

        Ok(Self {
            code: decode_code(&request.code)?,
            code_type: request.code_type,
            message: request.message,
            storage_routes,
            functions,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn host_is_ignored_when_identity_is_explicit() {
        let request: ResolveRequest = serde_json::from_str(
            r#"{"subdomain": "api", "host": "shop.workers.dev", "path": "/x"}"#,
        )
        .unwrap();
        assert_eq!(request.identity("workers.dev"), Identity::subdomain("api"));

        let request: ResolveRequest =
            serde_json::from_str(r#"{"host": "shop.workers.dev"}"#).unwrap();
        assert_eq!(request.identity("workers.dev"), Identity::subdomain("shop"));
        assert_eq!(request.path, "/");
    }

    #[test]
    fn deploy_request_expands_manifest() {
        let request: DeployRequest = serde_json::from_str(
            r#"{
                "code": "ZXhwb3J0IGRlZmF1bHQge30=",
                "manifest": {"immutable": ["/_app/*"], "prerendered": ["/about"]},
                "functions": [{"pattern": "/api/*", "code": "e30="}]
            }"#,
        )
        .unwrap();
        let deploy = Deploy::try_from(request).unwrap();
        assert_eq!(deploy.code, b"export default {}");
        assert_eq!(deploy.storage_routes.len(), 2);
        assert_eq!(deploy.storage_routes[0].priority, 3);
        assert_eq!(deploy.functions[0].code, b"{}");
        assert_eq!(deploy.functions[0].code_type, CodeType::Javascript);
    }

    #[test]
    fn deploy_request_rejects_routes_and_manifest_together() {
        let request: DeployRequest = serde_json::from_str(
            r#"{"code": "e30=", "routes": [{"pattern": "/a", "priority": 1}], "manifest": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            Deploy::try_from(request),
            Err(PlaneError::InvalidInput(_))
        ));
    }

    #[test]
    fn deploy_request_rejects_bad_base64() {
        let request: DeployRequest =
            serde_json::from_str(r#"{"code": "not base64!"}"#).unwrap();
        assert!(matches!(
            Deploy::try_from(request),
            Err(PlaneError::InvalidInput("code must be standard base64"))
        ));
    }
}
