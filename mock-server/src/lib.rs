//! In-memory CRM backend.
//!
//! Serves the REST contract the integration client talks to under `/api`,
//! plus the `/api/persons/` family used by the admin frontend. Records are
//! schemaless JSON objects with uuid string ids. Creating a record whose
//! dedup field matches an existing one answers `409 Conflict` with the
//! existing record, which carries its `id`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub type Record = Map<String, Value>;

/// The record collections the backend stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Website,
    WebsiteUser,
    Contact,
    Webform,
    Submission,
    Campaign,
    TargetList,
    Attachment,
}

impl Kind {
    /// Field whose value must be unique within the collection.
    pub fn dedup_field(self) -> Option<&'static str> {
        match self {
            Kind::Website => Some("url"),
            Kind::Contact => Some("email"),
            Kind::WebsiteUser | Kind::Webform | Kind::Submission => Some("dedup_key"),
            Kind::Campaign | Kind::TargetList => Some("mailjet_id"),
            Kind::Attachment => None,
        }
    }

    fn required(self) -> &'static [&'static str] {
        match self {
            Kind::Website => &["name", "url"],
            Kind::WebsiteUser => &["contact_id", "email"],
            Kind::Contact => &["email"],
            Kind::Webform => &["name"],
            Kind::Submission => &[],
            Kind::Campaign | Kind::TargetList => &["name", "mailjet_id"],
            Kind::Attachment => &["name", "content_base64"],
        }
    }
}

/// String form of a scalar JSON value, used for dedup and query matching.
fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct Collection {
    records: Vec<Record>,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records
            .iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
    }

    pub fn find_by(&self, field: &str, value: &str) -> Option<&Record> {
        self.records
            .iter()
            .find(|r| r.get(field).and_then(scalar_key).as_deref() == Some(value))
    }

    /// Records matching every `field=value` pair.
    pub fn filter(&self, query: &HashMap<String, String>) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| {
                query
                    .iter()
                    .all(|(k, v)| r.get(k).and_then(scalar_key).as_deref() == Some(v.as_str()))
            })
            .cloned()
            .collect()
    }

    fn insert(&mut self, mut record: Record) -> Record {
        record.insert("id".into(), Uuid::new_v4().to_string().into());
        self.records.push(record.clone());
        record
    }

    fn merge(&mut self, id: &str, patch: Record) -> Option<Record> {
        let record = self.get_mut(id)?;
        for (key, value) in patch {
            if key != "id" {
                record.insert(key, value);
            }
        }
        Some(record.clone())
    }

    fn remove(&mut self, id: &str) -> Option<Record> {
        let index = self
            .records
            .iter()
            .position(|r| r.get("id").and_then(Value::as_str) == Some(id))?;
        Some(self.records.remove(index))
    }
}

#[derive(Debug, Default)]
pub struct Store {
    pub websites: Collection,
    pub website_users: Collection,
    pub contacts: Collection,
    pub webforms: Collection,
    pub submissions: Collection,
    pub campaigns: Collection,
    pub target_lists: Collection,
    pub attachments: Collection,
    /// Target list id to member contact ids.
    pub list_members: HashMap<String, BTreeSet<String>>,
}

impl Store {
    pub fn collection(&self, kind: Kind) -> &Collection {
        match kind {
            Kind::Website => &self.websites,
            Kind::WebsiteUser => &self.website_users,
            Kind::Contact => &self.contacts,
            Kind::Webform => &self.webforms,
            Kind::Submission => &self.submissions,
            Kind::Campaign => &self.campaigns,
            Kind::TargetList => &self.target_lists,
            Kind::Attachment => &self.attachments,
        }
    }

    fn collection_mut(&mut self, kind: Kind) -> &mut Collection {
        match kind {
            Kind::Website => &mut self.websites,
            Kind::WebsiteUser => &mut self.website_users,
            Kind::Contact => &mut self.contacts,
            Kind::Webform => &mut self.webforms,
            Kind::Submission => &mut self.submissions,
            Kind::Campaign => &mut self.campaigns,
            Kind::TargetList => &mut self.target_lists,
            Kind::Attachment => &mut self.attachments,
        }
    }

    /// The existing record that `record` would duplicate.
    fn conflicting(&self, kind: Kind, record: &Record) -> Option<&Record> {
        let field = kind.dedup_field()?;
        let value = record.get(field).and_then(scalar_key)?;
        self.collection(kind).find_by(field, &value)
    }

    /// Insert, or report the record it collides with.
    pub fn create(&mut self, kind: Kind, record: Record) -> Result<Record, Record> {
        if let Some(existing) = self.conflicting(kind, &record) {
            return Err(existing.clone());
        }
        Ok(self.collection_mut(kind).insert(record))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            api_key: api_key.map(Into::into),
        }
    }
}

pub fn app() -> Router {
    app_with_key(None)
}

/// Router whose write endpoints require `Authorization: Token <key>` or
/// `Bearer <key>` when `api_key` is set.
pub fn app_with_key(api_key: Option<String>) -> Router {
    router(AppState::new(api_key))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/websites", get(list_websites).post(create_website))
        .route("/websites/{id}", get(get_website))
        .route(
            "/websites/{id}/users",
            get(list_website_users).post(create_website_user),
        )
        .route("/website-users/{id}", put(update_website_user))
        .route("/contacts", get(list_contacts).post(create_contact))
        .route("/contacts/{id}", get(get_contact).put(update_contact))
        .route("/webforms", get(list_webforms).post(create_webform))
        .route(
            "/webforms/{id}/submissions",
            get(list_submissions).post(create_submission),
        )
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/{id}", put(update_campaign))
        .route("/target-lists", get(list_target_lists).post(create_target_list))
        .route("/target-lists/{id}", put(update_target_list))
        .route(
            "/target-lists/{id}/contacts",
            get(list_members).post(add_members),
        )
        .route("/attachments", post(create_attachment))
        .route("/persons/", get(list_persons).post(create_person))
        .route(
            "/persons/{id}/",
            get(get_person).put(update_person).delete(delete_person),
        )
        .route("/persons/bulk_import/", post(bulk_import))
        .route("/webforms/", get(frontend_webforms))
        .route("/webform-submissions/", get(frontend_submissions))
        .route(
            "/webform-submissions/sync_from_drupal/",
            post(resync_submissions),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_key))
        .with_state(state);

    Router::new().nest("/api", api)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_key(listener: TcpListener, api_key: Option<String>) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_key(api_key)).await
}

async fn require_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(key) = &state.api_key {
        if request.method() != Method::GET {
            let authorized = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split_once(' '))
                .is_some_and(|(scheme, token)| {
                    matches!(scheme, "Token" | "Bearer") && token == &**key
                });
            if !authorized {
                return reply(
                    StatusCode::UNAUTHORIZED,
                    json!({"detail": "Authentication credentials were not provided."}),
                );
            }
        }
    }
    next.run(request).await
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn not_found() -> Response {
    reply(StatusCode::NOT_FOUND, json!({"detail": "Not found."}))
}

fn missing_fields(kind: Kind, record: &Record) -> Option<Value> {
    let missing: Map<String, Value> = kind
        .required()
        .iter()
        .filter(|f| record.get(**f).is_none_or(|v| v.is_null() || v == ""))
        .map(|f| (f.to_string(), json!(["This field is required."])))
        .collect();
    (!missing.is_empty()).then_some(Value::Object(missing))
}

/// Empty strings are stored as null.
fn normalize_empty_strings(record: Record) -> Record {
    record
        .into_iter()
        .map(|(k, v)| if v == "" { (k, Value::Null) } else { (k, v) })
        .collect()
}

async fn create(state: &AppState, kind: Kind, record: Record) -> Response {
    if let Some(errors) = missing_fields(kind, &record) {
        return reply(StatusCode::BAD_REQUEST, errors);
    }
    match state.store.write().await.create(kind, record) {
        Ok(created) => {
            tracing::debug!(?kind, id = ?created.get("id"), "created");
            reply(StatusCode::CREATED, Value::Object(created))
        }
        Err(existing) => {
            tracing::debug!(?kind, id = ?existing.get("id"), "duplicate");
            reply(StatusCode::CONFLICT, Value::Object(existing))
        }
    }
}

async fn items(state: &AppState, kind: Kind, query: &HashMap<String, String>) -> Response {
    let items = state.store.read().await.collection(kind).filter(query);
    reply(StatusCode::OK, json!({ "items": items }))
}

async fn fetch(state: &AppState, kind: Kind, id: &str) -> Response {
    match state.store.read().await.collection(kind).get(id) {
        Some(record) => reply(StatusCode::OK, Value::Object(record.clone())),
        None => not_found(),
    }
}

async fn merge(state: &AppState, kind: Kind, id: &str, patch: Record) -> Response {
    match state.store.write().await.collection_mut(kind).merge(id, patch) {
        Some(record) => reply(StatusCode::OK, Value::Object(record)),
        None => not_found(),
    }
}

type Filters = Query<HashMap<String, String>>;

async fn list_websites(State(s): State<AppState>, Query(q): Filters) -> Response {
    items(&s, Kind::Website, &q).await
}

async fn create_website(State(s): State<AppState>, Json(body): Json<Record>) -> Response {
    create(&s, Kind::Website, body).await
}

async fn get_website(State(s): State<AppState>, Path(id): Path<String>) -> Response {
    fetch(&s, Kind::Website, &id).await
}

async fn list_website_users(
    State(s): State<AppState>,
    Path(website_id): Path<String>,
    Query(mut q): Filters,
) -> Response {
    q.insert("website_id".into(), website_id);
    items(&s, Kind::WebsiteUser, &q).await
}

async fn create_website_user(
    State(s): State<AppState>,
    Path(website_id): Path<String>,
    Json(mut body): Json<Record>,
) -> Response {
    if s.store.read().await.websites.get(&website_id).is_none() {
        return not_found();
    }
    body.insert("website_id".into(), website_id.into());
    create(&s, Kind::WebsiteUser, body).await
}

async fn update_website_user(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> Response {
    merge(&s, Kind::WebsiteUser, &id, body).await
}

async fn list_contacts(State(s): State<AppState>, Query(q): Filters) -> Response {
    items(&s, Kind::Contact, &q).await
}

async fn create_contact(State(s): State<AppState>, Json(body): Json<Record>) -> Response {
    create(&s, Kind::Contact, normalize_empty_strings(body)).await
}

async fn get_contact(State(s): State<AppState>, Path(id): Path<String>) -> Response {
    fetch(&s, Kind::Contact, &id).await
}

async fn update_contact(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> Response {
    merge(&s, Kind::Contact, &id, normalize_empty_strings(body)).await
}

async fn list_webforms(State(s): State<AppState>, Query(q): Filters) -> Response {
    items(&s, Kind::Webform, &q).await
}

async fn create_webform(State(s): State<AppState>, Json(body): Json<Record>) -> Response {
    create(&s, Kind::Webform, body).await
}

async fn list_submissions(
    State(s): State<AppState>,
    Path(webform_id): Path<String>,
    Query(mut q): Filters,
) -> Response {
    q.insert("webform_id".into(), webform_id);
    items(&s, Kind::Submission, &q).await
}

async fn create_submission(
    State(s): State<AppState>,
    Path(webform_id): Path<String>,
    Json(mut body): Json<Record>,
) -> Response {
    if s.store.read().await.webforms.get(&webform_id).is_none() {
        return not_found();
    }
    body.insert("webform_id".into(), webform_id.into());
    create(&s, Kind::Submission, body).await
}

async fn list_campaigns(State(s): State<AppState>, Query(q): Filters) -> Response {
    items(&s, Kind::Campaign, &q).await
}

async fn create_campaign(State(s): State<AppState>, Json(body): Json<Record>) -> Response {
    create(&s, Kind::Campaign, body).await
}

async fn update_campaign(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> Response {
    merge(&s, Kind::Campaign, &id, body).await
}

async fn list_target_lists(State(s): State<AppState>, Query(q): Filters) -> Response {
    items(&s, Kind::TargetList, &q).await
}

async fn create_target_list(State(s): State<AppState>, Json(body): Json<Record>) -> Response {
    create(&s, Kind::TargetList, body).await
}

async fn update_target_list(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> Response {
    merge(&s, Kind::TargetList, &id, body).await
}

#[derive(Debug, Deserialize)]
pub struct AddMembers {
    pub contact_ids: Vec<Value>,
}

async fn list_members(State(s): State<AppState>, Path(list_id): Path<String>) -> Response {
    let store = s.store.read().await;
    if store.target_lists.get(&list_id).is_none() {
        return not_found();
    }
    let members: Vec<&String> = store
        .list_members
        .get(&list_id)
        .map(|m| m.iter().collect())
        .unwrap_or_default();
    reply(StatusCode::OK, json!({ "items": members }))
}

async fn add_members(
    State(s): State<AppState>,
    Path(list_id): Path<String>,
    Json(body): Json<AddMembers>,
) -> Response {
    let mut store = s.store.write().await;
    if store.target_lists.get(&list_id).is_none() {
        return not_found();
    }
    let members = store.list_members.entry(list_id).or_default();
    let added = body
        .contact_ids
        .iter()
        .filter_map(scalar_key)
        .filter(|id| members.insert(id.clone()))
        .count();
    reply(StatusCode::OK, json!({ "success": true, "added": added }))
}

async fn create_attachment(State(s): State<AppState>, Json(body): Json<Record>) -> Response {
    create(&s, Kind::Attachment, body).await
}

// Frontend contract: plain arrays and trailing-slash routes.

async fn list_persons(State(s): State<AppState>, Query(q): Filters) -> Response {
    let filters: HashMap<String, String> = q
        .into_iter()
        .filter(|(k, _)| k == "email" || k == "source_website")
        .collect();
    let persons = s.store.read().await.contacts.filter(&filters);
    reply(StatusCode::OK, Value::Array(persons.into_iter().map(Value::Object).collect()))
}

async fn create_person(State(s): State<AppState>, Json(body): Json<Record>) -> Response {
    create(&s, Kind::Contact, normalize_empty_strings(body)).await
}

async fn get_person(State(s): State<AppState>, Path(id): Path<String>) -> Response {
    fetch(&s, Kind::Contact, &id).await
}

async fn update_person(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> Response {
    merge(&s, Kind::Contact, &id, normalize_empty_strings(body)).await
}

async fn delete_person(State(s): State<AppState>, Path(id): Path<String>) -> Response {
    match s.store.write().await.contacts.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkImport {
    #[serde(default)]
    pub records: Vec<Record>,
}

async fn bulk_import(State(s): State<AppState>, Json(body): Json<BulkImport>) -> Response {
    if body.records.is_empty() {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({"created": 0, "updated": 0, "skipped": 0, "errors": ["no records provided"]}),
        );
    }

    let mut store = s.store.write().await;
    let (mut created, mut skipped) = (0, 0);
    let mut errors = Vec::new();
    for (row, record) in body.records.into_iter().enumerate() {
        let record = normalize_empty_strings(record);
        if record.get("email").and_then(scalar_key).is_none() {
            errors.push(json!({"row": row + 1, "error": "missing email", "data": record}));
            skipped += 1;
            continue;
        }
        match store.create(Kind::Contact, record) {
            Ok(_) => created += 1,
            Err(_) => skipped += 1,
        }
    }
    reply(
        StatusCode::CREATED,
        json!({"created": created, "updated": 0, "skipped": skipped, "errors": errors}),
    )
}

async fn frontend_webforms(State(s): State<AppState>) -> Response {
    let webforms = s.store.read().await.webforms.filter(&HashMap::new());
    reply(StatusCode::OK, Value::Array(webforms.into_iter().map(Value::Object).collect()))
}

async fn frontend_submissions(State(s): State<AppState>, Query(q): Filters) -> Response {
    let filters: HashMap<String, String> =
        q.into_iter().filter(|(k, _)| k == "webform_id").collect();
    let submissions = s.store.read().await.submissions.filter(&filters);
    reply(StatusCode::OK, Value::Array(submissions.into_iter().map(Value::Object).collect()))
}

/// Manual resync trigger. There is no site behind the mock, so it only
/// reports what is already stored.
async fn resync_submissions(State(s): State<AppState>) -> Response {
    let stored = s.store.read().await.submissions.len();
    reply(
        StatusCode::OK,
        json!({
            "status": "success",
            "returncode": 0,
            "output": format!("{stored} submissions stored"),
            "message": "synchronisation finished",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn create_assigns_uuid_id() {
        let mut store = Store::default();
        let created = store
            .create(Kind::Website, record(json!({"name": "Site", "url": "https://a.test"})))
            .unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(store.websites.len(), 1);
    }

    #[test]
    fn duplicate_returns_existing_record() {
        let mut store = Store::default();
        let first = store
            .create(Kind::Campaign, record(json!({"name": "A", "mailjet_id": 7})))
            .unwrap();
        let existing = store
            .create(Kind::Campaign, record(json!({"name": "B", "mailjet_id": "7"})))
            .unwrap_err();
        assert_eq!(existing["id"], first["id"]);
        assert_eq!(store.campaigns.len(), 1);
    }

    #[test]
    fn attachments_never_conflict() {
        let mut store = Store::default();
        let body = json!({"name": "a.txt", "content_base64": ""});
        store.create(Kind::Attachment, record(body.clone())).unwrap();
        store.create(Kind::Attachment, record(body)).unwrap();
        assert_eq!(store.attachments.len(), 2);
    }

    #[test]
    fn filter_matches_numbers_as_strings() {
        let mut store = Store::default();
        store
            .create(Kind::TargetList, record(json!({"name": "L", "mailjet_id": 5})))
            .unwrap();
        let query = HashMap::from([("mailjet_id".to_string(), "5".to_string())]);
        assert_eq!(store.target_lists.filter(&query).len(), 1);
        let query = HashMap::from([("mailjet_id".to_string(), "6".to_string())]);
        assert!(store.target_lists.filter(&query).is_empty());
    }

    #[test]
    fn merge_keeps_id() {
        let mut collection = Collection::default();
        let created = collection.insert(record(json!({"email": "a@example.com"})));
        let id = created["id"].as_str().unwrap().to_string();
        let merged = collection
            .merge(&id, record(json!({"id": "other", "first_name": "Ann"})))
            .unwrap();
        assert_eq!(merged["id"], id.as_str());
        assert_eq!(merged["first_name"], "Ann");
        assert!(collection.merge("missing", Record::new()).is_none());
    }

    #[test]
    fn empty_strings_become_null() {
        let normalized = normalize_empty_strings(record(json!({"country": "", "email": "a@b.c"})));
        assert!(normalized["country"].is_null());
        assert_eq!(normalized["email"], "a@b.c");
    }

    #[test]
    fn required_fields_are_reported() {
        let errors = missing_fields(Kind::Website, &record(json!({"name": "Site"}))).unwrap();
        assert!(errors.get("url").is_some());
        assert!(errors.get("name").is_none());
        assert!(missing_fields(Kind::Submission, &Record::new()).is_none());
    }
}
