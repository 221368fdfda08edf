pub mod config;
pub mod errors;
pub mod metrics;
pub mod results;
pub mod search;
pub mod source;

pub use config::{ConfigOverrides, EncodingMode, SearchConfig};
pub use errors::{SearchError, SearchResult};
pub use results::{MatchRecord, SearchOutput, SearchStatus, SkipReason, SourceFailure};
pub use search::{search, CancellationToken, SearchCoordinator, SearchHandle};
pub use source::{DictionaryDir, EntrySource, SourceLoader, SourceSelection};
