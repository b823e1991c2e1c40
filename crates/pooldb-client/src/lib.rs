//! # pooldb-client
//!
//! The boundary between pooldb and a persistent backing store.
//!
//! pooldb never speaks a wire protocol itself. Anything that can open a
//! session, run a parameterized non-reading command and stream one integer
//! column in ascending order can sit underneath the pools and the id
//! allocator by implementing [`Connector`] and [`Connection`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use pooldb_client::{ColumnRef, Connection, Connector, Endpoint, Value};
//!
//! let endpoint = Endpoint::new("db.internal:5432").credentials("game", "secret");
//! let mut conn = connector.connect(&endpoint).await?;
//! conn.open().await?;
//!
//! let affected = conn
//!     .execute("UPDATE guilds SET name = @name WHERE id = @id", &[Value::from("Ravens"), Value::from(7)])
//!     .await?;
//!
//! let column = ColumnRef::new("guilds", "id")?;
//! let ids = conn.sorted_ids(&column).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod column;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod instrumentation;
pub mod query;
pub mod value;

pub use column::ColumnRef;
pub use connection::{Connection, Connector, IdStream};
pub use endpoint::{Credentials, Endpoint};
pub use error::{Error, Result};
pub use query::{ParamSlot, QueryShape};
pub use value::{ParamType, Value};
