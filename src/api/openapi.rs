use super::handlers::{
    domains, environments, health, projects, resolve, storage, users, workers,
};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that also drives the `OpenAPI` document. Register endpoints here
/// with `.routes(routes!(...))` so they are served and documented together.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(resolve::resolve))
        .routes(routes!(users::create_user))
        .routes(routes!(storage::create_storage_config))
        .routes(routes!(environments::create_environment))
        .routes(routes!(environments::set_environment_value))
        .routes(routes!(workers::create_worker))
        .routes(routes!(workers::delete_worker))
        .routes(routes!(workers::link_environment))
        .routes(routes!(workers::upgrade_worker))
        .routes(routes!(workers::deploy))
        .routes(routes!(projects::create_project))
        .routes(routes!(projects::delete_project))
        .routes(routes!(projects::link_environment))
        .routes(routes!(domains::create_domain));

    router.get_openapi_mut().tags = Some(
        [
            ("health", "Liveness and database reachability"),
            ("resolve", "Request dispatch lookup for the edge"),
            ("users", "Account records"),
            ("storage", "Storage configs referenced by ASSETS bindings"),
            ("environments", "Environments and typed bindings"),
            ("workers", "Workers, upgrades and deploys"),
            ("projects", "Projects and their shared environment"),
            ("domains", "Custom domains"),
        ]
        .into_iter()
        .map(|(name, description)| {
            let mut tag = Tag::new(name);
            tag.description = Some(description.to_string());
            tag
        })
        .collect(),
    );

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

// Cargo authors look like "Name <email>"; only the first one is used.
fn cargo_contact() -> Option<Contact> {
    let primary = env!("CARGO_PKG_AUTHORS").split(':').next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (name.trim(), email.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = (!name.is_empty()).then(|| name.to_string());
    contact.email = (!email.is_empty()).then(|| email.to_string());
    Some(contact)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
