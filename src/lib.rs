//! # solr-fusion
//!
//! A config-driven search front end for Apache Solr and Lucidworks Fusion.
//!
//! A caller names a *query id*; the crate resolves it to a connector and a
//! query definition, compiles the definition plus runtime inputs into an
//! ordered set of Solr request parameters, dispatches the request to the
//! right backend, and normalizes the reply into one canonical JSON shape.
//! Index maintenance (datasource recrawls, document deletes) and Fusion
//! signal forwarding ride on the same configuration.
//!
//! ## Architecture
//!
//! ```text
//! query id ──▶ ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌───────────┐
//!  + inputs    │ resolver │──▶│  query  │──▶│ backend  │──▶│ normalize │──▶ canonical
//!              └────┬─────┘   └─────────┘   │solr/fusion│  └───────────┘    response
//!                   │                       └──────────┘
//!              ┌────┴─────┐
//!              │  store   │  immutable config snapshots
//!              └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Configuration records |
//! | [`error`] | Typed pipeline errors and their caller-facing mapping |
//! | [`store`] | Versioned configuration snapshots |
//! | [`params`] | Ordered multi-value request parameters |
//! | [`resolver`] | Query id → connector + query definition |
//! | [`query`] | Request compilation |
//! | [`backend`] | Solr/Fusion URL layout and the outbound call |
//! | [`translate`] | Facet term labels |
//! | [`normalize`] | Canonical response shapes |
//! | [`search`] | End-to-end search and suggest |
//! | [`refresh`] | Datasource recrawl and document delete |
//! | [`jobs`] | Background refresh queue |
//! | [`signals`] | Fusion signal forwarding |
//! | [`server`] | HTTP server |

pub mod backend;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod normalize;
pub mod params;
pub mod query;
pub mod refresh;
pub mod resolver;
pub mod search;
pub mod server;
pub mod signals;
pub mod store;
pub mod translate;
