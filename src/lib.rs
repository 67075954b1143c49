//! An authorization engine for "model group" resources shared by a
//! distributed machine-learning plugin. It decides, per request, whether an
//! identity may read or mutate a named model group based on ownership, the
//! group's visibility mode, and the intersection of backend-role claims, and
//! it injects that decision into a search query tree so that listing
//! operations are filtered at the data-access boundary instead of after the
//! fact.
//!
//! # Overview
//!
//! [`ModelAccessControl`] is the decision engine. It reads an
//! [`AccessControlSettings`] handle on every call (the security layer can be
//! absent, and the access-control flag is dynamic), fetches the protected
//! [`ModelGroup`] through a [`ModelGroupFetcher`], and evaluates the policy:
//!
//! - `Public` groups are visible to everyone, including unauthenticated
//!   callers.
//! - `Private` groups are visible to their owner only.
//! - `Restricted` groups are visible to callers sharing at least one backend
//!   role with the group.
//!
//! An absent identity is `Option::<Identity>::None` throughout, never an
//! empty-string name; every decision function branches on that sum type
//! exactly once at its entry.
//!
//! Permission decisions travel as plain booleans on the success channel.
//! Only infrastructural failures (missing document, unreachable store) and
//! broken invariants (a restricted group without backend roles) use the
//! error channel, so callers can render "forbidden" and "error" distinctly.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use modelgate::{
//!     AccessControlSettings, AccessMode, DocumentStore, FetchError, Identity,
//!     ModelAccessControl, ModelGroup, ModelGroupFetcher,
//! };
//!
//! // A toy document store backed by a map of serialized model groups.
//! struct InMemoryStore {
//!     documents: HashMap<String, Vec<u8>>,
//! }
//!
//! #[async_trait]
//! impl DocumentStore for InMemoryStore {
//!     async fn fetch_by_id(&self, id: &str) -> Result<Vec<u8>, FetchError> {
//!         self.documents
//!             .get(id)
//!             .cloned()
//!             .ok_or_else(|| FetchError::NotFound(id.to_string()))
//!     }
//! }
//!
//! let owner = Identity::parse("owner|IT,HR|myTenant");
//! let group = ModelGroup::new("group-1")
//!     .with_owner(owner.clone())
//!     .with_access(AccessMode::Restricted)
//!     .with_backend_roles(["IT", "HR"]);
//!
//! let store = InMemoryStore {
//!     documents: HashMap::from([(
//!         "group-1".to_string(),
//!         serde_json::to_vec(&group).unwrap(),
//!     )]),
//! };
//! let fetcher = ModelGroupFetcher::new(Arc::new(store));
//!
//! let settings = Arc::new(AccessControlSettings::new(true));
//! let engine = ModelAccessControl::new(settings);
//!
//! # tokio_test::block_on(async {
//! // A caller sharing a backend role with the group may access it.
//! let caller = Identity::parse("user|IT|myTenant");
//! assert!(engine
//!     .validate_access(Some(&caller), Some("group-1"), &fetcher)
//!     .await
//!     .unwrap());
//!
//! // A caller with no overlapping role may not.
//! let outsider = Identity::parse("user|Finance|myTenant");
//! assert!(!engine
//!     .validate_access(Some(&outsider), Some("group-1"), &fetcher)
//!     .await
//!     .unwrap());
//! # });
//! ```
//!
//! # Search filtering
//!
//! [`ModelAccessControl::add_role_filter`] scopes an existing
//! [`SearchSource`] to what the identity is permitted to see, and
//! [`ModelAccessControl::build_filtered_query`] produces a minimal pre-scoped
//! source for listing operations. The crate only builds and merges
//! [`Query`] clauses; executing them belongs to the search backend.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Role claim that bypasses all access-control checks.
pub const ALL_ACCESS_ROLE: &str = "all_access";

/// Document field holding the group owner's name, as indexed by the store.
pub const OWNER_NAME_FIELD: &str = "owner.name.keyword";
/// Document field holding the group's access mode.
pub const ACCESS_FIELD: &str = "access";
/// Document field holding the group's backend roles.
pub const BACKEND_ROLES_FIELD: &str = "backend_roles.keyword";

/// An authenticated caller: name, tenant scope, and backend-role claims
/// supplied by the external identity provider.
///
/// An *absent* identity (no security layer installed, or an internal caller)
/// is represented as `Option::<Identity>::None` at every decision seam, never
/// as an `Identity` with an empty name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    /// Caller name; non-empty for any authenticated caller.
    pub name: String,
    /// Role claims attached by the identity provider. May be empty.
    pub backend_roles: BTreeSet<String>,
    /// Opaque multi-tenancy scope. May be empty.
    pub tenant: String,
}

impl Identity {
    /// Creates an identity with the given name and no roles or tenant.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the backend-role claims.
    pub fn with_backend_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backend_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tenant scope.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    /// Parses the pipe-delimited external representation
    /// `name|role1,role2|tenant`.
    ///
    /// Parsing is total: missing or empty segments yield empty strings and
    /// empty role sets. Absent identity is *not* expressible here; callers
    /// represent it as `None` instead of parsing an empty string.
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.splitn(3, '|');
        let name = segments.next().unwrap_or("").to_string();
        let backend_roles = segments
            .next()
            .unwrap_or("")
            .split(',')
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect();
        let tenant = segments.next().unwrap_or("").to_string();
        Self {
            name,
            backend_roles,
            tenant,
        }
    }
}

/// Renders the pipe-delimited form. Roles are emitted in sorted order, so
/// `Identity::parse` of the output reproduces the identity.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles: Vec<&str> = self.backend_roles.iter().map(String::as_str).collect();
        write!(f, "{}|{}|{}", self.name, roles.join(","), self.tenant)
    }
}

/// Visibility mode of a model group.
///
/// The "unset" state of legacy records is `Option::<AccessMode>::None` on the
/// record itself, so every decision site matches this enum exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Visible and usable by anyone, including unauthenticated callers.
    Public,
    /// Owner only.
    Private,
    /// Owner, or any caller sharing a backend role with the group.
    Restricted,
}

impl AccessMode {
    /// The wire/query-term value of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Public => "public",
            AccessMode::Private => "private",
            AccessMode::Restricted => "restricted",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored resource being protected.
///
/// Constructed fresh per request from storage bytes; the `with_*` updates are
/// builder-style composition for creation and tests, not in-place mutation of
/// stored state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelGroup {
    /// Stable identifier, assigned at creation.
    pub model_group_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Identity that created the group. Absent on records that predate the
    /// security layer.
    pub owner: Option<Identity>,
    /// Meaningful only when `access` is [`AccessMode::Restricted`].
    pub backend_roles: BTreeSet<String>,
    /// `None` on legacy records that never carried a mode.
    pub access: Option<AccessMode>,
}

impl ModelGroup {
    /// Creates a group with the given id and everything else unset.
    pub fn new(model_group_id: impl Into<String>) -> Self {
        Self {
            model_group_id: model_group_id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_owner(mut self, owner: Identity) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_backend_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backend_roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

/// Process-wide gate over the two flags that decide whether access control
/// applies at all.
///
/// `security_enabled` reflects whether the external security layer is
/// installed; `access_control_enabled` is a dynamic cluster flag that
/// defaults to `true` and may flip at any time between decisions. Both are
/// read fresh on every call, so an in-flight settings change is observed by
/// the next decision.
///
/// Share the gate as an `Arc<AccessControlSettings>`; the settings-change
/// listener that calls the setters lives outside this crate.
#[derive(Debug)]
pub struct AccessControlSettings {
    security_enabled: AtomicBool,
    access_control_enabled: AtomicBool,
}

impl AccessControlSettings {
    /// Creates a gate with the given security-layer state and the
    /// access-control flag at its default (`true`).
    pub fn new(security_enabled: bool) -> Self {
        Self {
            security_enabled: AtomicBool::new(security_enabled),
            access_control_enabled: AtomicBool::new(true),
        }
    }

    pub fn security_enabled(&self) -> bool {
        self.security_enabled.load(Ordering::Relaxed)
    }

    pub fn set_security_enabled(&self, enabled: bool) {
        self.security_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn access_control_enabled(&self) -> bool {
        self.access_control_enabled.load(Ordering::Relaxed)
    }

    pub fn set_access_control_enabled(&self, enabled: bool) {
        self.access_control_enabled.store(enabled, Ordering::Relaxed);
    }

    /// True iff the security layer is present *and* the dynamic flag is on.
    pub fn is_access_control_required(&self) -> bool {
        self.security_enabled() && self.access_control_enabled()
    }
}

impl Default for AccessControlSettings {
    /// No security layer, access-control flag at its default (`true`).
    fn default() -> Self {
        Self::new(false)
    }
}

/// Failure of the underlying document store.
///
/// "Not found" is distinct from "backend unavailable" so callers can decide
/// how to render a missing resource; this engine never conflates either with
/// a permission denial.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("model group {0} not found")]
    NotFound(String),
    #[error("model group store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of an authorization check.
///
/// Decisions themselves are booleans; these variants cover infrastructure
/// failures and broken invariants, which must stop the operation rather than
/// default to allow or deny.
#[derive(Debug, Error)]
pub enum AccessControlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The stored document could not be deserialized.
    #[error("malformed model group document: {0}")]
    MalformedDocument(#[from] serde_json::Error),
    /// A restricted group was evaluated with an empty backend-role set.
    #[error("Backend roles shouldn't be null")]
    MissingBackendRoles,
    /// A record reached a revalidation checkpoint without an access mode.
    #[error("Access mode shouldn't be null")]
    MissingAccessMode,
}

/// Asynchronous fetch-by-id contract of the external document store.
///
/// Implementations return the raw serialized document; deserialization is the
/// adapter's job. One fetch per decision, no retries here (retry policy, if
/// any, belongs to the store client).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_by_id(&self, id: &str) -> Result<Vec<u8>, FetchError>;
}

/// Adapter between the engine and a [`DocumentStore`]: fetches a model-group
/// document and deserializes it.
#[derive(Clone)]
pub struct ModelGroupFetcher {
    store: Arc<dyn DocumentStore>,
}

impl ModelGroupFetcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Fetches the group with the given id.
    ///
    /// Propagates store failures unchanged and surfaces undecodable
    /// documents as [`AccessControlError::MalformedDocument`].
    pub async fn fetch(&self, model_group_id: &str) -> Result<ModelGroup, AccessControlError> {
        let bytes = self.store.fetch_by_id(model_group_id).await?;
        let group = serde_json::from_slice(&bytes)?;
        Ok(group)
    }
}

/// The policy engine.
///
/// All operations are deterministic given their inputs; the settings gate is
/// re-read on every call. The engine holds no per-decision state, so
/// concurrent [`validate_access`](Self::validate_access) calls are fully
/// independent.
#[derive(Clone)]
pub struct ModelAccessControl {
    settings: Arc<AccessControlSettings>,
}

impl ModelAccessControl {
    pub fn new(settings: Arc<AccessControlSettings>) -> Self {
        Self { settings }
    }

    /// True iff the identity is present and holds the [`ALL_ACCESS_ROLE`]
    /// superuser role.
    pub fn is_admin(identity: Option<&Identity>) -> bool {
        match identity {
            Some(identity) => identity.backend_roles.contains(ALL_ACCESS_ROLE),
            None => false,
        }
    }

    /// True when access control does not apply: the gate is off, or the
    /// identity is a superuser.
    pub fn skip_access_control(&self, identity: Option<&Identity>) -> bool {
        !self.settings.is_access_control_required() || Self::is_admin(identity)
    }

    /// True iff both identities are present and share a name.
    ///
    /// An absent identity never owns anything, and two absent identities do
    /// not own each other; the `(None, None)` case is deliberately `false`
    /// because it governs safe defaults elsewhere.
    pub fn is_owner(a: Option<&Identity>, b: Option<&Identity>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.name == b.name,
            _ => false,
        }
    }

    /// Role-overlap test against a group.
    ///
    /// Public groups match every caller, including an absent identity. For
    /// any other mode (private, restricted, or unset) an absent identity
    /// never matches, and a present one matches iff the role sets intersect.
    pub fn has_backend_role_overlap(identity: Option<&Identity>, group: &ModelGroup) -> bool {
        if group.access == Some(AccessMode::Public) {
            return true;
        }
        let Some(identity) = identity else {
            return false;
        };
        !group.backend_roles.is_disjoint(&identity.backend_roles)
    }

    /// Authorizes `identity` against the group named by `group_id`.
    ///
    /// The permissive creation-time check: a missing group id, an ownerless
    /// (legacy) record, or a disabled gate all allow the operation. The one
    /// fetch is the only suspension point; everything after it is pure.
    ///
    /// Store failures, undecodable documents, and a restricted group with an
    /// empty role set surface on the error channel; the boolean channel
    /// carries only genuine decisions.
    #[tracing::instrument(skip_all, fields(model_group_id = group_id))]
    pub async fn validate_access(
        &self,
        identity: Option<&Identity>,
        group_id: Option<&str>,
        fetcher: &ModelGroupFetcher,
    ) -> Result<bool, AccessControlError> {
        let Some(group_id) = group_id.filter(|id| !id.is_empty()) else {
            tracing::debug!("no model group attached, allowing");
            return Ok(true);
        };
        let group = fetcher.fetch(group_id).await?;
        if group.owner.is_none() {
            // Record predates the security layer; such groups stay readable.
            tracing::debug!("ownerless model group, allowing");
            return Ok(true);
        }
        if self.skip_access_control(identity) {
            tracing::debug!("access control not required, allowing");
            return Ok(true);
        }
        let allowed = match group.access {
            Some(AccessMode::Public) => true,
            Some(AccessMode::Private) => Self::is_owner(group.owner.as_ref(), identity),
            Some(AccessMode::Restricted) => {
                if group.backend_roles.is_empty() {
                    return Err(AccessControlError::MissingBackendRoles);
                }
                Self::has_backend_role_overlap(identity, &group)
            }
            None => {
                Self::is_owner(group.owner.as_ref(), identity)
                    || Self::has_backend_role_overlap(identity, &group)
            }
        };
        tracing::trace!(allowed, "model group access evaluated");
        Ok(allowed)
    }

    /// Revalidates a caller against a group that may have changed since the
    /// first check, e.g. before allowing a further mutation.
    ///
    /// Unlike [`validate_access`](Self::validate_access) this path is strict:
    /// a restricted group without backend roles or a record without an access
    /// mode is a broken invariant and fails instead of silently deciding.
    pub fn owner_still_has_permission(
        &self,
        identity: Option<&Identity>,
        group: Option<&ModelGroup>,
    ) -> Result<bool, AccessControlError> {
        let Some(group) = group else {
            // Nothing to check.
            return Ok(true);
        };
        match group.access {
            Some(AccessMode::Public) => Ok(true),
            Some(AccessMode::Private) => Ok(Self::is_owner(identity, group.owner.as_ref())),
            Some(AccessMode::Restricted) => {
                if group.backend_roles.is_empty() {
                    Err(AccessControlError::MissingBackendRoles)
                } else {
                    Ok(Self::has_backend_role_overlap(identity, group))
                }
            }
            None => Err(AccessControlError::MissingAccessMode),
        }
    }

    /// Scopes a search to what `identity` is permitted to see.
    ///
    /// Adds an OR clause requiring ownership, public visibility, or a
    /// restricted-mode role overlap. A `Bool` root query absorbs the clause
    /// as an additional `must`; a match-all root is replaced outright; any
    /// other root is rewrapped so the original query and the scope clause
    /// are both required. When access control does not apply, or the
    /// identity is absent, the source passes through untouched.
    pub fn add_role_filter(
        &self,
        identity: Option<&Identity>,
        source: SearchSource,
    ) -> SearchSource {
        if self.skip_access_control(identity) {
            return source;
        }
        let Some(identity) = identity else {
            return source;
        };
        let scope = Query::Bool(Self::role_scope_clause(identity));
        let query = match source.query {
            None | Some(Query::MatchAll) => scope,
            Some(Query::Bool(mut root)) => {
                root.must.push(scope);
                Query::Bool(root)
            }
            Some(other) => Query::Bool(BoolQuery::new().must(other).must(scope)),
        };
        SearchSource { query: Some(query) }
    }

    /// Minimal pre-scoped search source for listing operations.
    ///
    /// Degenerates to a match-all query when no filter applies.
    pub fn build_filtered_query(&self, identity: Option<&Identity>) -> SearchSource {
        let source = self.add_role_filter(identity, SearchSource::new());
        if source.query.is_none() {
            return SearchSource::new().with_query(Query::MatchAll);
        }
        source
    }

    fn role_scope_clause(identity: &Identity) -> BoolQuery {
        BoolQuery::new()
            .should(Query::term(OWNER_NAME_FIELD, identity.name.as_str()))
            .should(Query::term(ACCESS_FIELD, AccessMode::Public.as_str()))
            .should(Query::Bool(
                BoolQuery::new()
                    .must(Query::term(ACCESS_FIELD, AccessMode::Restricted.as_str()))
                    .must(Query::terms(
                        BACKEND_ROLES_FIELD,
                        identity.backend_roles.iter().cloned(),
                    )),
            ))
    }
}

/// A node of the abstract boolean query tree handed to the search backend.
///
/// This crate only builds and merges clauses; it never executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every document.
    MatchAll,
    /// Field equals value.
    Term { field: String, value: String },
    /// Field value is a member of the set.
    Terms { field: String, values: Vec<String> },
    /// Boolean composite.
    Bool(BoolQuery),
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Boolean composite clause: all of `must`, at least one of `should`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a required clause.
    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    /// Appends an alternative clause.
    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }
}

/// Container for the root query of a search request, mirroring the search
/// backend's source builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSource {
    query: Option<Query>,
}

impl SearchSource {
    /// An empty source with no root query.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }
}

/// Failure while encoding or decoding a node envelope.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

fn wire_config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Fan-out request asking a set of nodes to undeploy the controller of one
/// model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndeployControllerNodesRequest {
    pub node_ids: Vec<Uuid>,
    pub model_id: String,
}

impl UndeployControllerNodesRequest {
    pub fn new(node_ids: Vec<Uuid>, model_id: impl Into<String>) -> Self {
        Self {
            node_ids,
            model_id: model_id.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(encode_to_vec(self, wire_config())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (request, _) = decode_from_slice(bytes, wire_config())?;
        Ok(request)
    }
}

/// One node's answer to an undeploy-controller fan-out.
///
/// The status mapping is keyed by `name:version` strings; `None` means the
/// node reported no statuses at all, which round-trips distinctly from an
/// empty mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndeployControllerNodeResponse {
    pub node_id: Uuid,
    pub status: Option<BTreeMap<String, String>>,
}

impl UndeployControllerNodeResponse {
    pub fn new(node_id: Uuid, status: Option<BTreeMap<String, String>>) -> Self {
        Self { node_id, status }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(encode_to_vec(self, wire_config())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (response, _) = decode_from_slice(bytes, wire_config())?;
        Ok(response)
    }
}


#[cfg(test)]
mod query_filter_tests {
    use super::*;

    fn engine() -> ModelAccessControl {
        ModelAccessControl::new(Arc::new(AccessControlSettings::new(true)))
    }

    fn user() -> Identity {
        Identity::parse("owner|IT,HR|myTenant")
    }

    fn assert_scope_clause(query: &Query, identity: &Identity) {
        let Query::Bool(clause) = query else {
            panic!("expected a bool scope clause, got {:?}", query);
        };
        assert_eq!(clause.should.len(), 3);
        assert!(clause
            .should
            .contains(&Query::term(OWNER_NAME_FIELD, identity.name.as_str())));
        assert!(clause.should.contains(&Query::term(ACCESS_FIELD, "public")));
        let restricted = Query::Bool(
            BoolQuery::new()
                .must(Query::term(ACCESS_FIELD, "restricted"))
                .must(Query::terms(
                    BACKEND_ROLES_FIELD,
                    identity.backend_roles.iter().cloned(),
                )),
        );
        assert!(clause.should.contains(&restricted));
    }

    #[test]
    fn filter_becomes_root_of_empty_source() {
        let identity = user();
        let source = engine().add_role_filter(Some(&identity), SearchSource::new());
        assert_scope_clause(source.query().expect("query set"), &identity);
    }

    #[test]
    fn filter_merges_into_existing_bool_root() {
        let identity = user();
        let root = BoolQuery::new().must(Query::term("name", "testModelGroup"));
        let source = SearchSource::new().with_query(Query::Bool(root));

        let filtered = engine().add_role_filter(Some(&identity), source);
        let Some(Query::Bool(merged)) = filtered.query() else {
            panic!("expected bool root, got {:?}", filtered.query());
        };
        assert_eq!(merged.must.len(), 2);
        assert_eq!(merged.must[0], Query::term("name", "testModelGroup"));
        assert_scope_clause(&merged.must[1], &identity);
    }

    #[test]
    fn filter_replaces_match_all_root() {
        let identity = user();
        let source = SearchSource::new().with_query(Query::MatchAll);
        let filtered = engine().add_role_filter(Some(&identity), source);
        assert_scope_clause(filtered.query().expect("query set"), &identity);
    }

    #[test]
    fn filter_rewraps_other_roots() {
        let identity = user();
        let source = SearchSource::new().with_query(Query::term("name", "testModelGroup"));
        let filtered = engine().add_role_filter(Some(&identity), source);

        let Some(Query::Bool(wrapped)) = filtered.query() else {
            panic!("expected bool root, got {:?}", filtered.query());
        };
        assert!(wrapped.should.is_empty());
        assert_eq!(wrapped.must.len(), 2);
        assert_eq!(wrapped.must[0], Query::term("name", "testModelGroup"));
        assert_scope_clause(&wrapped.must[1], &identity);
    }

    #[test]
    fn filter_is_noop_for_absent_identity() {
        let source = SearchSource::new().with_query(Query::MatchAll);
        let filtered = engine().add_role_filter(None, source.clone());
        assert_eq!(filtered, source);
    }

    #[test]
    fn filter_is_noop_when_gate_disabled() {
        let settings = Arc::new(AccessControlSettings::new(true));
        settings.set_access_control_enabled(false);
        let engine = ModelAccessControl::new(settings);

        let identity = user();
        let source = SearchSource::new().with_query(Query::term("name", "x"));
        let filtered = engine.add_role_filter(Some(&identity), source.clone());
        assert_eq!(filtered, source);
    }

    #[test]
    fn build_filtered_query_scopes_listing() {
        let identity = user();
        let source = engine().build_filtered_query(Some(&identity));
        assert_scope_clause(source.query().expect("query set"), &identity);
    }

    #[test]
    fn build_filtered_query_degenerates_to_match_all() {
        let engine = ModelAccessControl::new(Arc::new(AccessControlSettings::new(false)));
        let source = engine.build_filtered_query(Some(&user()));
        assert_eq!(source.query(), Some(&Query::MatchAll));
    }
}
