//! # Semantic router
//!
//! [`SemanticRouter`] maps a free-text query to the closest intent [`Route`].
//!
//! ## Matching
//! 1. The query is embedded with the router's [`Embedder`].
//! 2. Every reference within the search radius (the largest route threshold) is
//!    collected from the [`ReferenceStore`] with its cosine distance.
//! 3. Hits are grouped per route, optionally cut to the nearest `reference_k`, and
//!    folded into one score with the configured [`DistanceAggregationMethod`].
//! 4. The threshold gate keeps a route only if its score is strictly below the route's
//!    `distance_threshold`.
//! 5. Survivors are sorted ascending by distance and cut to `max_k`.
//!
//! ## Persistence
//! The definition (routes + routing config) and every reference embedding live in
//! SQLite (`routers` and `route_references`). Reopening a router with an identical
//! definition reuses the stored embeddings; a different definition must be rebuilt with
//! `overwrite = true`.
//!
//! ## Quick Example
//! ```no_run
//! use bank_router::banking::banking_router_definition;
//! use bank_router::config::establish_connection;
//! use bank_router::embeddings::SentenceEmbeddingsModel;
//! use bank_router::reference_store::IndexKind;
//! use bank_router::route::RoutingConfig;
//! use bank_router::router::SemanticRouter;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SentenceEmbeddingsModel::load_default().await?;
//! let conn = establish_connection("bank_router.db")?;
//! let definition = banking_router_definition("banking_router", RoutingConfig::default());
//! let router = SemanticRouter::new(definition, Box::new(model), conn, true, IndexKind::Flat)?;
//! if let Some(m) = router.route("I want a personal loan")? {
//!     println!("{} ({:.3})", m.name, m.distance);
//! }
//! # Ok(()) }
//! ```

use diesel::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::ensure_schema;
use crate::embeddings::Embedder;
use crate::error::{Result, RouterError};
use crate::models::{ReferenceRow, RouterRow};
use crate::reference_store::{IndexKind, ReferenceHit, ReferenceStore};
use crate::route::{
    DistanceAggregationMethod, Route, RouteMatch, RouterDefinition, RoutingConfig, validate_threshold,
};
use crate::schema::{route_references, routers};

/// Hex `blake3` digest of a reference text.
pub fn reference_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Stable key of a stored reference: `<router>:<route>:<hash>`.
pub fn reference_key(router: &str, route: &str, text: &str) -> String {
    format!("{router}:{route}:{}", reference_hash(text))
}

fn encode_vector(vector: &[f32]) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(vector, bincode::config::standard())?)
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    let (vector, _) = bincode::serde::decode_from_slice::<Vec<f32>, _>(bytes, bincode::config::standard())?;
    Ok(vector)
}

/// Intent router over reference-phrase embeddings.
pub struct SemanticRouter {
    definition: RouterDefinition,
    store: ReferenceStore,
    embedder: Box<dyn Embedder>,
    connection: SqliteConnection,
}

impl SemanticRouter {
    /// Build (or reopen) a router.
    ///
    /// - `overwrite = true`: any persisted state under this name is dropped and every
    ///   reference is embedded again.
    /// - `overwrite = false` and an identical persisted definition: stored embeddings are
    ///   reused and the embedder is not called.
    /// - `overwrite = false` and a different persisted definition:
    ///   [`RouterError::ExistingRouter`].
    ///
    /// # Errors
    /// Validation errors, embedding failures and database errors propagate.
    pub fn new(
        definition: RouterDefinition,
        embedder: Box<dyn Embedder>,
        mut connection: SqliteConnection,
        overwrite: bool,
        index_kind: IndexKind,
    ) -> Result<Self> {
        definition.validate()?;
        ensure_schema(&mut connection)?;
        let dimension = embedder.dimension();

        if overwrite {
            info!("Overwriting router '{}'", definition.name);
            delete_persisted(&mut connection, &definition.name)?;
        } else if let Some(row) = find_router_row(&mut connection, &definition.name)? {
            let stored = RouterDefinition::from_yaml_str(&row.definition)?;
            if stored != definition || row.dimension as usize != dimension {
                return Err(RouterError::ExistingRouter(definition.name));
            }
            info!("Reusing stored embeddings for router '{}'", definition.name);
            let store = load_store(&mut connection, &definition.name, dimension, index_kind)?;
            return Ok(Self {
                definition,
                store,
                embedder,
                connection,
            });
        }

        let routes = definition.routes.clone();
        let mut router = Self {
            definition,
            store: ReferenceStore::new(dimension, index_kind),
            embedder,
            connection,
        };
        for route in &routes {
            router.embed_references(&route.name, &route.references)?;
        }
        router.persist_definition()?;
        info!(
            "Router '{}' ready with {} routes and {} references",
            router.definition.name,
            router.definition.routes.len(),
            router.store.len()
        );
        Ok(router)
    }

    /// Reopen a persisted router without knowing its definition up front.
    pub fn from_existing(
        name: &str,
        embedder: Box<dyn Embedder>,
        mut connection: SqliteConnection,
        index_kind: IndexKind,
    ) -> Result<Self> {
        ensure_schema(&mut connection)?;
        let row = find_router_row(&mut connection, name)?
            .ok_or_else(|| RouterError::RouterNotFound(name.to_string()))?;
        let definition = RouterDefinition::from_yaml_str(&row.definition)?;
        let dimension = embedder.dimension();
        if row.dimension as usize != dimension {
            return Err(RouterError::DimensionMismatch {
                expected: row.dimension as usize,
                actual: dimension,
            });
        }
        let store = load_store(&mut connection, name, dimension, index_kind)?;
        Ok(Self {
            definition,
            store,
            embedder,
            connection,
        })
    }

    /// Load a router definition from YAML and build it.
    pub fn from_yaml(
        path: &Path,
        embedder: Box<dyn Embedder>,
        connection: SqliteConnection,
        overwrite: bool,
        index_kind: IndexKind,
    ) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let definition = RouterDefinition::from_yaml_str(&content)?;
        Self::new(definition, embedder, connection, overwrite, index_kind)
    }

    /// Write the router definition to YAML.
    ///
    /// # Errors
    /// An `AlreadyExists` IO error if the file exists and `overwrite` is false.
    pub fn to_yaml(&self, path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            return Err(RouterError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )));
        }
        fs::write(path, self.definition.to_yaml_string()?)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &RouterDefinition {
        &self.definition
    }

    pub fn routes(&self) -> &[Route] {
        &self.definition.routes
    }

    pub fn route_names(&self) -> Vec<String> {
        self.definition.route_names()
    }

    pub fn routing_config(&self) -> &RoutingConfig {
        &self.definition.routing_config
    }

    pub fn get(&self, route_name: &str) -> Option<&Route> {
        self.definition.get(route_name)
    }

    /// Number of stored reference embeddings.
    pub fn reference_count(&self) -> usize {
        self.store.len()
    }

    /// Best matching route, or `None` when no route passes its threshold.
    pub fn route(&self, query: &str) -> Result<Option<RouteMatch>> {
        Ok(self.route_many(query, Some(1), None)?.into_iter().next())
    }

    /// Up to `max_k` matching routes, closest first.
    ///
    /// `None` arguments fall back to the router's [`RoutingConfig`].
    pub fn route_many(
        &self,
        query: &str,
        max_k: Option<usize>,
        aggregation: Option<DistanceAggregationMethod>,
    ) -> Result<Vec<RouteMatch>> {
        let vector = self.embedder.embed(query)?;
        let matches = self.route_vector(&vector, max_k, aggregation)?;
        debug!("Routed {query:?} -> {matches:?}");
        Ok(matches)
    }

    /// Same as [`route_many`](Self::route_many) for a precomputed query embedding.
    pub fn route_vector(
        &self,
        vector: &[f32],
        max_k: Option<usize>,
        aggregation: Option<DistanceAggregationMethod>,
    ) -> Result<Vec<RouteMatch>> {
        let config = &self.definition.routing_config;
        let max_k = max_k.unwrap_or(config.max_k);
        if max_k == 0 {
            return Err(RouterError::InvalidRoute("max_k must be at least 1".into()));
        }
        let aggregation = aggregation.unwrap_or(config.aggregation_method);

        let hits = self.store.within(vector, self.definition.max_threshold())?;
        Ok(rank_routes(
            &self.definition.routes,
            &hits,
            max_k,
            aggregation,
            config.reference_k,
        ))
    }

    /// Reference phrases of a route.
    pub fn get_route_references(&self, route_name: &str) -> Result<Vec<String>> {
        self.definition
            .get(route_name)
            .map(|r| r.references.clone())
            .ok_or_else(|| RouterError::RouteNotFound(route_name.to_string()))
    }

    /// Embed and store new references for an existing route.
    ///
    /// Returns the keys of the stored references. References already present are
    /// re-embedded in place.
    pub fn add_route_references(&mut self, route_name: &str, references: &[String]) -> Result<Vec<String>> {
        if self.definition.get(route_name).is_none() {
            return Err(RouterError::RouteNotFound(route_name.to_string()));
        }
        if references.iter().any(|r| r.trim().is_empty()) {
            return Err(RouterError::InvalidRoute(format!(
                "route '{route_name}' cannot take an empty reference"
            )));
        }

        let keys = self.embed_references(route_name, references)?;
        if let Some(route) = self.definition.get_mut(route_name) {
            for reference in references {
                if !route.references.contains(reference) {
                    route.references.push(reference.clone());
                }
            }
        }
        self.persist_definition()?;
        info!("Added {} references to route '{route_name}'", keys.len());
        Ok(keys)
    }

    /// Remove references from a route. Returns how many were removed.
    ///
    /// # Errors
    /// [`RouterError::InvalidRoute`] if the route would be left with no references.
    pub fn delete_route_references(&mut self, route_name: &str, references: &[String]) -> Result<usize> {
        let route = self
            .definition
            .get(route_name)
            .ok_or_else(|| RouterError::RouteNotFound(route_name.to_string()))?;
        let remaining = route
            .references
            .iter()
            .filter(|r| !references.contains(r))
            .count();
        if remaining == 0 {
            return Err(RouterError::InvalidRoute(format!(
                "route '{route_name}' must keep at least one reference"
            )));
        }

        let hashes: Vec<String> = references.iter().map(|r| reference_hash(r)).collect();
        let router_name = self.definition.name.clone();
        diesel::delete(
            route_references::table
                .filter(route_references::router_name.eq(&router_name))
                .filter(route_references::route_name.eq(route_name))
                .filter(route_references::reference_hash.eq_any(hashes)),
        )
        .execute(&mut self.connection)?;

        let mut removed = 0;
        for reference in references {
            if self.store.remove_reference(route_name, reference)? {
                removed += 1;
            }
        }
        if let Some(route) = self.definition.get_mut(route_name) {
            route.references.retain(|r| !references.contains(r));
        }
        self.persist_definition()?;
        Ok(removed)
    }

    /// Add a new route and embed its references.
    pub fn add_route(&mut self, route: Route) -> Result<()> {
        route.validate()?;
        if self.definition.get(&route.name).is_some() {
            return Err(RouterError::InvalidRoute(format!(
                "duplicate route name '{}'",
                route.name
            )));
        }
        self.embed_references(&route.name, &route.references)?;
        self.definition.routes.push(route);
        self.persist_definition()
    }

    /// Remove a route with all its references.
    pub fn remove_route(&mut self, route_name: &str) -> Result<()> {
        if self.definition.get(route_name).is_none() {
            return Err(RouterError::RouteNotFound(route_name.to_string()));
        }
        let router_name = self.definition.name.clone();
        diesel::delete(
            route_references::table
                .filter(route_references::router_name.eq(&router_name))
                .filter(route_references::route_name.eq(route_name)),
        )
        .execute(&mut self.connection)?;
        self.store.remove_route(route_name)?;
        self.definition.routes.retain(|r| r.name != route_name);
        self.persist_definition()
    }

    /// Change thresholds of several routes at once. Nothing changes if any entry is invalid.
    pub fn update_route_thresholds(&mut self, thresholds: &HashMap<String, f32>) -> Result<()> {
        for (name, threshold) in thresholds {
            if self.definition.get(name).is_none() {
                return Err(RouterError::RouteNotFound(name.clone()));
            }
            validate_threshold(name, *threshold)?;
        }
        for (name, threshold) in thresholds {
            if let Some(route) = self.definition.get_mut(name) {
                route.distance_threshold = *threshold;
            }
        }
        self.persist_definition()
    }

    pub fn update_routing_config(&mut self, routing_config: RoutingConfig) -> Result<()> {
        routing_config.validate()?;
        self.definition.routing_config = routing_config;
        self.persist_definition()
    }

    /// Drop every stored reference but keep the definition. Queries match nothing until
    /// references are added again.
    pub fn clear(&mut self) -> Result<()> {
        let router_name = self.definition.name.clone();
        let removed = diesel::delete(route_references::table.filter(route_references::router_name.eq(&router_name)))
            .execute(&mut self.connection)?;
        self.store.clear();
        warn!("Cleared {removed} references from router '{router_name}'");
        Ok(())
    }

    /// Drop the router and all its persisted state.
    pub fn delete(mut self) -> Result<()> {
        delete_persisted(&mut self.connection, &self.definition.name)?;
        info!("Deleted router '{}'", self.definition.name);
        Ok(())
    }

    /// Give back the database connection.
    pub fn into_connection(self) -> SqliteConnection {
        self.connection
    }

    fn embed_references(&mut self, route_name: &str, references: &[String]) -> Result<Vec<String>> {
        let vectors = self.embedder.embed_many(references)?;
        let router_name = self.definition.name.clone();
        let dimension = self.store.dimension();

        let mut rows = Vec::with_capacity(references.len());
        let mut batch = Vec::with_capacity(references.len());
        let mut keys = Vec::with_capacity(references.len());
        for (text, vector) in references.iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(RouterError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            rows.push(ReferenceRow {
                id: None,
                router_name: router_name.clone(),
                route_name: route_name.to_string(),
                reference_hash: reference_hash(text),
                reference: text.clone(),
                embedding: encode_vector(&vector)?,
            });
            keys.push(reference_key(&router_name, route_name, text));
            batch.push((route_name.to_string(), text.clone(), vector));
        }

        self.connection.transaction(|conn| {
            for row in &rows {
                diesel::replace_into(route_references::table)
                    .values(row)
                    .execute(conn)?;
            }
            Ok::<_, diesel::result::Error>(())
        })?;
        self.store.insert_many(batch)?;
        Ok(keys)
    }

    fn persist_definition(&mut self) -> Result<()> {
        let row = RouterRow {
            name: self.definition.name.clone(),
            definition: self.definition.to_yaml_string()?,
            dimension: self.store.dimension() as i32,
        };
        diesel::replace_into(routers::table)
            .values(&row)
            .execute(&mut self.connection)?;
        Ok(())
    }
}

/// Group hits per route, aggregate, gate by threshold, sort and cut to `max_k`.
///
/// `hits` must be sorted ascending by distance so that `reference_k` keeps the nearest.
pub(crate) fn rank_routes(
    routes: &[Route],
    hits: &[ReferenceHit],
    max_k: usize,
    aggregation: DistanceAggregationMethod,
    reference_k: Option<usize>,
) -> Vec<RouteMatch> {
    let mut grouped: BTreeMap<&str, Vec<f32>> = BTreeMap::new();
    for hit in hits {
        grouped.entry(hit.route_name.as_str()).or_default().push(hit.distance);
    }

    let mut matches: Vec<RouteMatch> = routes
        .iter()
        .filter_map(|route| {
            let distances = grouped.get(route.name.as_str())?;
            let take = reference_k.map_or(distances.len(), |k| k.min(distances.len()));
            let distance = aggregation.aggregate(&distances[..take])?;
            (distance < route.distance_threshold).then(|| RouteMatch {
                name: route.name.clone(),
                distance,
            })
        })
        .collect();

    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.name.cmp(&b.name)));
    matches.truncate(max_k);
    matches
}

fn find_router_row(conn: &mut SqliteConnection, name: &str) -> Result<Option<RouterRow>> {
    Ok(routers::table
        .filter(routers::name.eq(name))
        .select(RouterRow::as_select())
        .first(conn)
        .optional()?)
}

fn load_store(
    conn: &mut SqliteConnection,
    router_name: &str,
    dimension: usize,
    index_kind: IndexKind,
) -> Result<ReferenceStore> {
    let rows: Vec<ReferenceRow> = route_references::table
        .filter(route_references::router_name.eq(router_name))
        .order(route_references::id.asc())
        .select(ReferenceRow::as_select())
        .load(conn)?;

    let batch = rows
        .into_iter()
        .map(|row| Ok((row.route_name, row.reference, decode_vector(&row.embedding)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut store = ReferenceStore::new(dimension, index_kind);
    store.insert_many(batch)?;
    debug!("Loaded {} references for router '{router_name}'", store.len());
    Ok(store)
}

fn delete_persisted(conn: &mut SqliteConnection, router_name: &str) -> Result<()> {
    conn.transaction(|conn| {
        diesel::delete(route_references::table.filter(route_references::router_name.eq(router_name)))
            .execute(conn)?;
        diesel::delete(routers::table.filter(routers::name.eq(router_name))).execute(conn)?;
        Ok::<_, diesel::result::Error>(())
    })?;
    Ok(())
}
