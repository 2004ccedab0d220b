//! Mimecast API 2.0 client core—vault-backed credentials, singleflight token lifecycle,
//! regional endpoints, and throttle-aware retries behind one uniform request call.
//!
//! Feature APIs (URL protection, directory, gateway) build an [`transport::ApiRequest`] and
//! hand it to [`transport::Transport::request`]. Everything below that call is handled here:
//!
//! - [`source`] fetches a secret blob from a backend and parses it into an
//!   [`auth::Credential`].
//! - [`region`] turns a region code or override URL into the API base URL.
//! - [`auth::TokenManager`] exchanges credentials for access tokens, refreshes them before they
//!   expire, and lets concurrent callers share a single in-flight exchange.
//! - [`rate_limit`] and [`retry`] decide when an attempt may go out and whether a failed
//!   attempt is retried.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod rate_limit;
pub mod region;
pub mod retry;
pub mod source;
pub mod transport;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
