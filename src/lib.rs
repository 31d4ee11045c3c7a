pub mod add;
pub mod ber;
pub mod bind;
pub mod compare;
pub mod config;
pub mod conn;
pub mod control;
pub mod delete;
mod dispatcher;
pub mod entry;
pub mod error;
pub mod extended;
pub mod filter;
pub mod metrics;
pub mod moddn;
pub mod modify;
pub mod passwd;
pub mod protocol;
mod reader;
pub mod result_code;
pub mod search;
pub mod tls;
pub mod transport;

pub use add::AddRequest;
pub use bind::SimpleBindRequest;
pub use config::Config;
pub use conn::{Connection, ConnectionOptions};
pub use control::Control;
pub use delete::DeleteRequest;
pub use dispatcher::ConnectionState;
pub use entry::{Entry, EntryAttribute};
pub use error::{LdapError, Result};
pub use extended::{ExtendedRequest, ExtendedResponse};
pub use metrics::Metrics;
pub use moddn::ModifyDnRequest;
pub use modify::{ModifyOperation, ModifyRequest};
pub use passwd::{PasswordModifyRequest, PasswordModifyResult};
pub use result_code::{LdapResult, ResultCode};
pub use search::{DerefAliases, DiscreteSearchResult, ResultHandler, Scope, SearchRequest, SearchResult};
pub use transport::TransportStream;
