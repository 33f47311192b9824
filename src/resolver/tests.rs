#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};

use super::*;
use crate::model::{BindingRecord, DomainTarget, EndpointRecord, RouteBackend, RouteRecord};

#[derive(Default)]
struct MemorySource {
    workers: HashSet<Uuid>,
    endpoints: Vec<(String, EndpointRecord)>,
    domains: HashMap<String, DomainTarget>,
    revisions: HashMap<Uuid, i64>,
    routes: HashMap<Uuid, Vec<RouteRecord>>,
    assets: HashMap<Uuid, BindingRecord>,
    route_reads: usize,
}

impl MemorySource {
    fn standalone(&mut self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.workers.insert(id);
        self.endpoints.push((
            name.to_string(),
            EndpointRecord {
                kind: EndpointKind::Worker,
                id,
                project_id: None,
            },
        ));
        id
    }

    /// A project whose main worker also carries the name, with the catch-all route.
    fn project(&mut self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.workers.insert(id);
        self.endpoints.push((
            name.to_string(),
            EndpointRecord {
                kind: EndpointKind::Worker,
                id,
                project_id: Some(id),
            },
        ));
        self.endpoints.push((
            name.to_string(),
            EndpointRecord {
                kind: EndpointKind::Project,
                id,
                project_id: None,
            },
        ));
        self.revisions.insert(id, 1);
        self.routes.insert(id, vec![worker_route("/*", 0, id)]);
        id
    }

    fn add_route(&mut self, project_id: Uuid, route: RouteRecord) {
        self.routes.entry(project_id).or_default().push(route);
        *self.revisions.entry(project_id).or_default() += 1;
    }

    fn bind_assets(&mut self, project_id: Uuid, value: &str, value_type: BindingType) {
        self.assets.insert(
            project_id,
            BindingRecord {
                value: value.to_string(),
                value_type: Some(value_type),
            },
        );
    }
}

impl EndpointSource for MemorySource {
    async fn worker_exists(&mut self, worker_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.workers.contains(&worker_id))
    }

    async fn endpoints_named(&mut self, name: &str) -> Result<Vec<EndpointRecord>, sqlx::Error> {
        Ok(self
            .endpoints
            .iter()
            .filter(|(entry_name, _)| entry_name == name)
            .map(|(_, entry)| *entry)
            .collect())
    }

    async fn domain_endpoint(
        &mut self,
        domain: &str,
    ) -> Result<Option<EndpointRecord>, sqlx::Error> {
        Ok(self.domains.get(domain).map(|target| match *target {
            DomainTarget::Worker(id) => EndpointRecord {
                kind: EndpointKind::Worker,
                id,
                project_id: self
                    .endpoints
                    .iter()
                    .find(|(_, entry)| entry.kind == EndpointKind::Worker && entry.id == id)
                    .and_then(|(_, entry)| entry.project_id),
            },
            DomainTarget::Project(id) => EndpointRecord {
                kind: EndpointKind::Project,
                id,
                project_id: None,
            },
        }))
    }

    async fn routes_revision(&mut self, project_id: Uuid) -> Result<Option<i64>, sqlx::Error> {
        Ok(self.revisions.get(&project_id).copied())
    }

    async fn project_routes(&mut self, project_id: Uuid) -> Result<Vec<RouteRecord>, sqlx::Error> {
        self.route_reads += 1;
        Ok(self.routes.get(&project_id).cloned().unwrap_or_default())
    }

    async fn assets_binding(
        &mut self,
        project_id: Uuid,
    ) -> Result<Option<BindingRecord>, sqlx::Error> {
        Ok(self.assets.get(&project_id).cloned())
    }
}

/// Always fails, for checking that read errors surface.
struct FailingSource;

impl EndpointSource for FailingSource {
    async fn worker_exists(&mut self, _: Uuid) -> Result<bool, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn endpoints_named(&mut self, _: &str) -> Result<Vec<EndpointRecord>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn domain_endpoint(&mut self, _: &str) -> Result<Option<EndpointRecord>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn routes_revision(&mut self, _: Uuid) -> Result<Option<i64>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn project_routes(&mut self, _: Uuid) -> Result<Vec<RouteRecord>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn assets_binding(&mut self, _: Uuid) -> Result<Option<BindingRecord>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }
}

fn worker_route(pattern: &str, priority: i32, worker_id: Uuid) -> RouteRecord {
    RouteRecord {
        pattern: pattern.to_string(),
        priority,
        backend: RouteBackend::Worker,
        worker_id: Some(worker_id),
    }
}

fn storage_route(pattern: &str, priority: i32) -> RouteRecord {
    RouteRecord {
        pattern: pattern.to_string(),
        priority,
        backend: RouteBackend::Storage,
        worker_id: None,
    }
}

#[tokio::test]
async fn explicit_worker_bypasses_project_routes() {
    let mut source = MemorySource::default();
    let project_id = source.project("shop");
    let function_id = Uuid::new_v4();
    source.add_route(project_id, worker_route("/**", 50, function_id));

    let resolver = Resolver::default();
    let resolution = resolver
        .resolve_with(&mut source, &Identity::worker(project_id), "/anything")
        .await
        .unwrap();

    assert_eq!(
        resolution,
        Resolution::Worker {
            worker_id: project_id
        }
    );
    assert_eq!(source.route_reads, 0);
}

#[tokio::test]
async fn unknown_explicit_worker_is_unresolved() {
    let mut source = MemorySource::default();
    source.standalone("api");
    let resolution = Resolver::default()
        .resolve_with(&mut source, &Identity::worker(Uuid::new_v4()), "/")
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Unresolved);
}

#[tokio::test]
async fn subdomain_of_standalone_worker() {
    let mut source = MemorySource::default();
    let worker_id = source.standalone("api");
    let resolution = Resolver::default()
        .resolve_with(&mut source, &Identity::subdomain("API"), "/v1")
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Worker { worker_id });
}

#[tokio::test]
async fn shared_name_resolves_to_the_project() {
    let mut source = MemorySource::default();
    let project_id = source.project("shop");
    let resolution = Resolver::default()
        .resolve_with(&mut source, &Identity::subdomain("shop"), "/cart")
        .await
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::ProjectWorker {
            project_id,
            worker_id: project_id
        }
    );
}

#[tokio::test]
async fn missing_identity_or_name_is_unresolved() {
    let mut source = MemorySource::default();
    let resolver = Resolver::default();
    for identity in [
        Identity::default(),
        Identity::subdomain("ghost"),
        Identity::domain("ghost.example.com"),
    ] {
        let resolution = resolver
            .resolve_with(&mut source, &identity, "/")
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Unresolved, "{identity:?}");
    }
}

#[tokio::test]
async fn custom_domains_reach_workers_and_projects() {
    let mut source = MemorySource::default();
    let worker_id = source.standalone("api");
    let project_id = source.project("shop");
    source
        .domains
        .insert("api.example.com".to_string(), DomainTarget::Worker(worker_id));
    source
        .domains
        .insert("shop.example.com".to_string(), DomainTarget::Project(project_id));

    let resolver = Resolver::default();
    let resolution = resolver
        .resolve_with(&mut source, &Identity::domain("API.example.com."), "/")
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Worker { worker_id });

    let resolution = resolver
        .resolve_with(&mut source, &Identity::domain("shop.example.com"), "/")
        .await
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::ProjectWorker {
            project_id,
            worker_id: project_id
        }
    );
}

#[tokio::test]
async fn domain_on_a_main_worker_follows_project_routes() {
    let mut source = MemorySource::default();
    let project_id = source.project("shop");
    source.add_route(project_id, storage_route("/assets/*", 10));
    let storage_config_id = Uuid::new_v4();
    source.bind_assets(
        project_id,
        &storage_config_id.to_string(),
        BindingType::Storage,
    );
    source
        .domains
        .insert("shop.example.com".to_string(), DomainTarget::Worker(project_id));

    let resolver = Resolver::default();
    let by_name = resolver
        .resolve_with(&mut source, &Identity::subdomain("shop"), "/assets/app.js")
        .await
        .unwrap();
    let by_domain = resolver
        .resolve_with(
            &mut source,
            &Identity::domain("shop.example.com"),
            "/assets/app.js",
        )
        .await
        .unwrap();

    assert_eq!(
        by_domain,
        Resolution::ProjectStorage {
            project_id,
            storage_config_id
        }
    );
    assert_eq!(by_domain, by_name);
}

#[tokio::test]
async fn most_specific_route_wins() {
    let mut source = MemorySource::default();
    let project_id = source.project("shop");
    let api = Uuid::new_v4();
    source.add_route(project_id, worker_route("/api/*", 10, api));
    source.add_route(project_id, storage_route("/api/health", 1));
    source.bind_assets(project_id, &Uuid::nil().to_string(), BindingType::Storage);

    let resolver = Resolver::default();
    let resolution = resolver
        .resolve_with(&mut source, &Identity::subdomain("shop"), "/api/users")
        .await
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::ProjectWorker {
            project_id,
            worker_id: api
        }
    );

    let resolution = resolver
        .resolve_with(&mut source, &Identity::subdomain("shop"), "api/health")
        .await
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::ProjectStorage {
            project_id,
            storage_config_id: Uuid::nil()
        }
    );
}

#[tokio::test]
async fn storage_route_without_assets_binding_does_not_fall_back() {
    let mut source = MemorySource::default();
    let project_id = source.project("site");
    source.add_route(project_id, storage_route("/assets/*", 3));

    let resolver = Resolver::default();
    let resolution = resolver
        .resolve_with(&mut source, &Identity::subdomain("site"), "/assets/app.js")
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::BindingMissing { project_id });

    // A binding of the wrong type is as good as none.
    source.bind_assets(project_id, &Uuid::nil().to_string(), BindingType::Var);
    let resolution = resolver
        .resolve_with(&mut source, &Identity::subdomain("site"), "/assets/app.js")
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::BindingMissing { project_id });
}

#[tokio::test]
async fn project_without_matching_route_is_no_route() {
    let mut source = MemorySource::default();
    let project_id = source.project("docs");
    source.routes.insert(project_id, vec![storage_route("/guide", 1)]);

    let resolution = Resolver::default()
        .resolve_with(&mut source, &Identity::subdomain("docs"), "/other")
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::NoRoute { project_id });
}

#[tokio::test]
async fn html_suffix_reaches_prerendered_route() {
    let mut source = MemorySource::default();
    let project_id = source.project("blog");
    source.routes.insert(project_id, vec![storage_route("/about", 1)]);
    let storage_id = Uuid::new_v4();
    source.bind_assets(project_id, &storage_id.to_string(), BindingType::Storage);

    let resolution = Resolver::default()
        .resolve_with(&mut source, &Identity::subdomain("blog"), "/about.html")
        .await
        .unwrap();
    assert_eq!(
        resolution,
        Resolution::ProjectStorage {
            project_id,
            storage_config_id: storage_id
        }
    );
}

#[tokio::test]
async fn reject_policy_reports_ambiguity() {
    let mut source = MemorySource::default();
    let project_id = source.project("twin");
    source.add_route(project_id, worker_route("/a/*", 5, Uuid::new_v4()));
    source.add_route(project_id, worker_route("/*/b", 5, Uuid::new_v4()));

    let err = Resolver::new(TieBreak::Reject)
        .resolve_with(&mut source, &Identity::subdomain("twin"), "/a/b")
        .await
        .unwrap_err();
    match err {
        ResolveError::AmbiguousRoute {
            project_id: reported,
            patterns,
        } => {
            assert_eq!(reported, project_id);
            assert_eq!(patterns.len(), 2);
        }
        ResolveError::Database(err) => panic!("unexpected database error: {err}"),
    }

    let resolution = Resolver::new(TieBreak::Lexical)
        .resolve_with(&mut source, &Identity::subdomain("twin"), "/a/b")
        .await
        .unwrap();
    assert!(matches!(resolution, Resolution::ProjectWorker { .. }));
}

#[tokio::test]
async fn route_tables_are_reused_until_the_revision_moves() {
    let mut source = MemorySource::default();
    let project_id = source.project("cached");
    let resolver = Resolver::default();
    let identity = Identity::subdomain("cached");

    resolver.resolve_with(&mut source, &identity, "/").await.unwrap();
    resolver.resolve_with(&mut source, &identity, "/x").await.unwrap();
    assert_eq!(source.route_reads, 1);

    let api = Uuid::new_v4();
    source.add_route(project_id, worker_route("/api", 10, api));
    let resolution = resolver
        .resolve_with(&mut source, &identity, "/api")
        .await
        .unwrap();
    assert_eq!(source.route_reads, 2);
    assert_eq!(
        resolution,
        Resolution::ProjectWorker {
            project_id,
            worker_id: api
        }
    );
}

#[tokio::test]
async fn read_failures_surface() {
    let err = Resolver::default()
        .resolve_with(&mut FailingSource, &Identity::subdomain("any"), "/")
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::Database(_)));
}

#[test]
fn host_classification() {
    assert_eq!(
        Identity::from_host("shop.workers.dev", "workers.dev"),
        Identity::subdomain("shop")
    );
    assert_eq!(
        Identity::from_host("Shop.Workers.Dev:443", "workers.dev"),
        Identity::subdomain("shop")
    );
    assert_eq!(
        Identity::from_host("www.shop.com", "workers.dev"),
        Identity::domain("www.shop.com")
    );
    assert_eq!(Identity::from_host("workers.dev", "workers.dev"), Identity::default());
    assert_eq!(
        Identity::from_host("a.b.workers.dev", "workers.dev"),
        Identity::default()
    );
}

#[test]
fn paths_are_rooted_and_stripped_of_queries() {
    assert_eq!(normalize_path("api/x"), "/api/x");
    assert_eq!(normalize_path(""), "/");
    assert_eq!(normalize_path("/a?b=c"), "/a");
}
