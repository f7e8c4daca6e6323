//! Astra database
//!
//! Creation and termination are asynchronous: the create call returns while the
//! database is still `PENDING`/`INITIALIZING`, and termination passes through
//! `TERMINATING`. Both wait on the database status. The `keyspaces` attribute
//! lists additional keyspaces that must exist and is the only attribute updated
//! in place; keyspaces are only ever added through it.

use std::collections::HashMap;

use astra_core::convergence::{ConvergeError, Converged, NotFoundPolicy};
use astra_core::provider::{ProviderError, ProviderResult};
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::info;

use super::{ignore_not_found, insert_opt, required_str, string_list};
use crate::models::{CreateDatabaseRequest, Database, DatabaseStatus};
use crate::probes::DatabaseProbe;
use crate::provider::{AstraProvider, Budget, ResultExt};
use crate::validation;

pub const TYPE: &str = "database";

const CLOUD_PROVIDERS: [&str; 3] = ["aws", "gcp", "azure"];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE)
        .with_description("Astra serverless database")
        .attribute(
            AttributeSchema::new("id", validation::uuid())
                .read_only()
                .with_description("Database UUID"),
        )
        .attribute(AttributeSchema::new("name", AttributeType::String).required().force_new())
        .attribute(
            AttributeSchema::new("keyspace", validation::keyspace_name())
                .required()
                .force_new()
                .with_description("Initial keyspace"),
        )
        .attribute(
            AttributeSchema::new(
                "cloud_provider",
                AttributeType::Enum(CLOUD_PROVIDERS.iter().map(|s| s.to_string()).collect()),
            )
            .required()
            .force_new()
            .with_provider_name("cloudProvider"),
        )
        .attribute(AttributeSchema::new("region", AttributeType::String).required().force_new())
        .attribute(
            AttributeSchema::new("tier", AttributeType::String)
                .force_new()
                .with_default(Value::from("serverless")),
        )
        .attribute(
            AttributeSchema::new("capacity_units", types::positive_int())
                .force_new()
                .with_default(Value::Int(1))
                .with_provider_name("capacityUnits"),
        )
        .attribute(
            AttributeSchema::new("db_type", AttributeType::Enum(vec!["vector".to_string()]))
                .force_new()
                .with_provider_name("dbType"),
        )
        .attribute(
            AttributeSchema::new("keyspaces", types::string_list())
                .additive()
                .with_description("Additional keyspaces, added in place"),
        )
        .attribute(AttributeSchema::new("status", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("organization_id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("cqlsh_url", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("graphql_url", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("data_endpoint_url", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("grafana_url", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("datacenters", types::string_list()).read_only())
}

/// Statuses a database never comes back from on its own
const FAILED: [DatabaseStatus; 3] = [
    DatabaseStatus::Error,
    DatabaseStatus::Terminated,
    DatabaseStatus::Terminating,
];

/// Wait until the database reports `status`.
///
/// A 404 is retried: a freshly created database is not always readable yet.
pub async fn wait_for_status(
    provider: &AstraProvider,
    database_id: &str,
    status: DatabaseStatus,
    budget: Budget,
) -> Result<Database, ConvergeError> {
    let failure = FAILED.into_iter().filter(|s| *s != status);
    let target = AstraProvider::target(budget, [status], failure)?
        .on_not_found(NotFoundPolicy::Retry);
    let probe = DatabaseProbe::new(&provider.devops, database_id);

    match provider.wait(&target, &probe).await? {
        Converged::Reached { payload, .. } => Ok(payload),
        Converged::Gone { attempts } => Err(ConvergeError::NotFound {
            resource: format!("database {}", database_id),
            attempts,
        }),
    }
}

pub(crate) fn database_to_state(id: &ResourceId, db: &Database) -> State {
    let mut keyspaces = db.info.additional_keyspaces.clone();
    keyspaces.sort();

    let mut attributes = HashMap::new();
    attributes.insert("id".to_string(), Value::from(db.id.as_str()));
    attributes.insert("status".to_string(), Value::from(db.status.as_str()));
    attributes.insert("keyspaces".to_string(), string_list(&keyspaces));
    attributes.insert(
        "datacenters".to_string(),
        Value::List(
            db.info
                .datacenters
                .iter()
                .map(|dc| Value::from(dc.id.as_str()))
                .collect(),
        ),
    );

    let info = &db.info;
    insert_opt(&mut attributes, "name", info.name.as_deref());
    insert_opt(&mut attributes, "keyspace", info.keyspace.as_deref());
    insert_opt(&mut attributes, "region", info.region.as_deref());
    insert_opt(&mut attributes, "tier", info.tier.as_deref());
    insert_opt(&mut attributes, "db_type", info.db_type.as_deref());
    if let Some(cloud) = &info.cloud_provider {
        attributes.insert("cloud_provider".to_string(), Value::from(cloud.to_lowercase()));
    }
    if let Some(units) = info.capacity_units {
        attributes.insert("capacity_units".to_string(), Value::Int(units));
    }
    insert_opt(&mut attributes, "organization_id", db.org_id.as_deref());
    insert_opt(&mut attributes, "cqlsh_url", db.cqlsh_url.as_deref());
    insert_opt(&mut attributes, "graphql_url", db.graphql_url.as_deref());
    insert_opt(&mut attributes, "data_endpoint_url", db.data_endpoint_url.as_deref());
    insert_opt(&mut attributes, "grafana_url", db.grafana_url.as_deref());

    State::existing(id.clone(), attributes).with_identifier(db.id.as_str())
}

pub(crate) async fn read(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let db = provider
        .devops
        .get_database(identifier)
        .await
        .context_for(id, "Failed to read database")?;

    match db {
        Some(db) if db.status != DatabaseStatus::Terminated => Ok(database_to_state(id, &db)),
        _ => Ok(State::not_found(id.clone())),
    }
}

fn desired_keyspaces(resource: &Resource) -> Vec<String> {
    resource
        .attributes
        .get("keyspaces")
        .and_then(Value::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) async fn create(provider: &AstraProvider, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let request = CreateDatabaseRequest {
        name: required_str(resource, "name")?.to_string(),
        keyspace: required_str(resource, "keyspace")?.to_string(),
        cloud_provider: required_str(resource, "cloud_provider")?.to_string(),
        region: required_str(resource, "region")?.to_string(),
        tier: resource.get_str("tier").unwrap_or("serverless").to_string(),
        capacity_units: resource.get_int("capacity_units").unwrap_or(1),
        db_type: resource.get_str("db_type").map(str::to_string),
    };

    let database_id = provider
        .devops
        .create_database(&request)
        .await
        .context_for(id, "Failed to create database")?;
    info!("Database {} created as {}, waiting for ACTIVE", request.name, database_id);

    // The database exists from here on; failures must still report its id
    let budget = Budget::start(provider.config().waits.database_create);
    let settled = async {
        let mut db = wait_for_status(provider, &database_id, DatabaseStatus::Active, budget)
            .await
            .context_for(id, &format!("Database {} did not become active", database_id))?;

        let extra = desired_keyspaces(resource);
        if !extra.is_empty() {
            db = add_keyspaces(provider, id, &db, &extra, budget).await?;
        }
        Ok::<_, ProviderError>(db)
    };

    match settled.await {
        Ok(db) => Ok(database_to_state(id, &db)),
        Err(e) => Err(e.with_identifier(database_id)),
    }
}

pub(crate) async fn update(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
    _from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let budget = Budget::start(provider.config().waits.database_update);
    let db = wait_for_status(provider, identifier, DatabaseStatus::Active, budget)
        .await
        .context_for(id, "Database is not active")?;

    let db = add_keyspaces(provider, id, &db, &desired_keyspaces(to), budget).await?;
    Ok(database_to_state(id, &db))
}

/// Add the listed keyspaces the database lacks, one at a time.
///
/// Keyspaces missing from the list are left alone: they may belong to a
/// `keyspace` resource.
async fn add_keyspaces(
    provider: &AstraProvider,
    id: &ResourceId,
    db: &Database,
    desired: &[String],
    budget: Budget,
) -> ProviderResult<Database> {
    let current = &db.info.additional_keyspaces;
    let default = db.info.keyspace.as_deref();

    let to_add = desired
        .iter()
        .filter(|ks| !current.contains(ks) && Some(ks.as_str()) != default);

    let mut latest = db.clone();
    for keyspace in to_add {
        info!("Adding keyspace {} to database {}", keyspace, db.id);
        provider
            .devops
            .add_keyspace(&db.id, keyspace)
            .await
            .context_for(id, &format!("Failed to add keyspace {}", keyspace))?;
        latest = wait_for_status(provider, &db.id, DatabaseStatus::Active, budget)
            .await
            .context_for(id, &format!("Database did not settle after adding {}", keyspace))?;
    }

    Ok(latest)
}

pub(crate) async fn delete(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    ignore_not_found(provider.devops.terminate_database(identifier).await)
        .context_for(id, "Failed to terminate database")?;

    let target = AstraProvider::target(
        Budget::start(provider.config().waits.database_delete),
        [DatabaseStatus::Terminated],
        [DatabaseStatus::Error],
    )
    .context_for(id, "Invalid wait")?
    .on_not_found(NotFoundPolicy::Succeed);
    let probe = DatabaseProbe::new(&provider.devops, identifier);

    provider
        .wait(&target, &probe)
        .await
        .context_for(id, &format!("Database {} was not terminated", identifier))?;
    info!("Database {} terminated", identifier);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaitSettings;
    use crate::provider::test_support::{provider, provider_with};
    use astra_core::differ::diff;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DB_ID: &str = "3f1c2d4e-5a6b-7c8d-9e0f-112233445566";

    fn body(status: &str, additional: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "id": DB_ID,
            "orgId": "org-1",
            "status": status,
            "cqlshUrl": "https://example/cqlsh",
            "info": {
                "name": "orders",
                "keyspace": "app",
                "additionalKeyspaces": additional,
                "cloudProvider": "GCP",
                "region": "us-east1",
                "tier": "serverless",
                "capacityUnits": 1,
                "datacenters": [{"id": format!("{}-1", DB_ID)}]
            }
        })
    }

    fn db_path() -> String {
        format!("/v2/databases/{}", DB_ID)
    }

    async fn mount_status_sequence(server: &MockServer, steps: &[(u16, Option<serde_json::Value>)]) {
        let (last, rest) = steps.split_last().unwrap();
        for (status, json) in rest {
            let mut template = ResponseTemplate::new(*status);
            if let Some(json) = json {
                template = template.set_body_json(json);
            }
            Mock::given(method("GET"))
                .and(path(db_path()))
                .respond_with(template)
                .up_to_n_times(1)
                .mount(server)
                .await;
        }
        let mut template = ResponseTemplate::new(last.0);
        if let Some(json) = &last.1 {
            template = template.set_body_json(json);
        }
        Mock::given(method("GET"))
            .and(path(db_path()))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn desired() -> Resource {
        Resource::new(TYPE, "main")
            .with_attribute("name", "orders")
            .with_attribute("keyspace", "app")
            .with_attribute("cloud_provider", "gcp")
            .with_attribute("region", "us-east1")
    }

    #[tokio::test]
    async fn create_waits_for_active() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/databases"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("/v2/databases/{}", DB_ID).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_status_sequence(
            &server,
            &[
                (404, None),
                (200, Some(body("PENDING", &[]))),
                (200, Some(body("INITIALIZING", &[]))),
                (200, Some(body("ACTIVE", &[]))),
            ],
        )
        .await;

        let state = provider(&server).create_resource(desired()).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some(DB_ID));
        assert_eq!(state.attributes["status"], Value::from("ACTIVE"));
        assert_eq!(state.attributes["cloud_provider"], Value::from("gcp"));
        assert_eq!(state.attributes["capacity_units"], Value::Int(1));
    }

    #[tokio::test]
    async fn create_fails_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/databases"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("/v2/databases/{}", DB_ID).as_str()),
            )
            .mount(&server)
            .await;
        mount_status_sequence(
            &server,
            &[(200, Some(body("PENDING", &[]))), (200, Some(body("ERROR", &[])))],
        )
        .await;

        let err = provider(&server).create_resource(desired()).await.unwrap_err();

        assert!(err.message.contains("ERROR"), "{}", err.message);
        assert!(err.message.contains(DB_ID));
        assert_eq!(err.resource_id, Some(ResourceId::new(TYPE, "main")));
    }

    #[tokio::test]
    async fn read_treats_terminated_as_gone() {
        let server = MockServer::start().await;
        mount_status_sequence(&server, &[(200, Some(body("TERMINATED", &[])))]).await;

        let state = provider(&server)
            .read_resource(&ResourceId::new(TYPE, "main"), Some(DB_ID))
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn create_timeout_reports_the_database_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/databases"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("/v2/databases/{}", DB_ID).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_status_sequence(&server, &[(200, Some(body("PENDING", &[])))]).await;

        let provider = provider_with(&server, |config| {
            config.waits.database_create = WaitSettings {
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(50),
            };
        });
        let err = provider.create_resource(desired()).await.unwrap_err();

        assert!(err.message.contains("timed out"), "{}", err.message);
        assert_eq!(err.identifier.as_deref(), Some(DB_ID));
    }

    #[tokio::test]
    async fn rejected_create_has_no_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/databases"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let err = provider(&server).create_resource(desired()).await.unwrap_err();
        assert_eq!(err.identifier, None);
    }

    #[tokio::test]
    async fn update_adds_missing_keyspaces_only() {
        let server = MockServer::start().await;
        mount_status_sequence(
            &server,
            &[
                (200, Some(body("ACTIVE", &["legacy"]))),
                (200, Some(body("ACTIVE", &["legacy", "audit"]))),
            ],
        )
        .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/keyspaces/audit", db_path())))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        // "legacy" may be owned by a keyspace resource
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let id = ResourceId::new(TYPE, "main");
        let to = desired().with_attribute("keyspaces", Value::List(vec![Value::from("audit")]));
        let from = State::existing(id.clone(), HashMap::new()).with_identifier(DB_ID);

        let state = provider(&server)
            .update_resource(&id, DB_ID, &from, &to)
            .await
            .unwrap();
        assert_eq!(
            state.attributes["keyspaces"],
            Value::List(vec![Value::from("audit"), Value::from("legacy")])
        );
    }

    #[test]
    fn keyspace_order_and_foreign_keyspaces_are_not_drift() {
        let db: Database =
            serde_json::from_value(body("ACTIVE", &["reports", "audit", "owned_elsewhere"]))
                .unwrap();
        let state = database_to_state(&ResourceId::new(TYPE, "main"), &db);
        assert_eq!(
            state.attributes["keyspaces"],
            Value::List(vec![
                Value::from("audit"),
                Value::from("owned_elsewhere"),
                Value::from("reports"),
            ])
        );

        let mut desired = desired().with_attribute(
            "keyspaces",
            Value::List(vec![Value::from("reports"), Value::from("audit")]),
        );
        schema().apply_defaults(&mut desired.attributes);
        assert!(!diff(&desired, &state, Some(&schema())).is_change());

        let mut wants_more = desired.with_attribute(
            "keyspaces",
            Value::List(vec![Value::from("audit"), Value::from("billing")]),
        );
        schema().apply_defaults(&mut wants_more.attributes);
        assert!(diff(&wants_more, &state, Some(&schema())).is_change());
    }

    #[tokio::test]
    async fn delete_succeeds_when_database_disappears() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/terminate", db_path())))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        mount_status_sequence(&server, &[(200, Some(body("TERMINATING", &[]))), (404, None)]).await;

        provider(&server)
            .delete_resource(&ResourceId::new(TYPE, "main"), DB_ID)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_times_out_while_terminating() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/terminate", db_path())))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        mount_status_sequence(&server, &[(200, Some(body("TERMINATING", &[])))]).await;

        let provider = provider_with(&server, |config| {
            config.waits.database_delete = WaitSettings {
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(50),
            };
        });

        let err = provider
            .delete_resource(&ResourceId::new(TYPE, "main"), DB_ID)
            .await
            .unwrap_err();
        assert!(err.message.contains("timed out"), "{}", err.message);
        assert!(err.message.contains("TERMINATING"));
    }
}
