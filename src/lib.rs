mod app;
mod command;
mod decision;
mod error;
mod fanout;
mod host;
mod prompt;
mod pty;
mod secret;
mod store;
mod term;

pub use app::{App, AppEnv, ConnectOptions};
pub use decision::{decide, AuthDecision, OverrideStore};
pub use error::Error;
pub use fanout::{Fanout, FanoutPlan, LayoutMode, TmuxCli, TmuxControl};
pub use host::{CatalogEntry, EffectiveHost, LoginMode, Resolver};
pub use prompt::PromptScanner;
pub use pty::{CommandBuilder, PtySession};
pub use secret::{CredentialRef, KeyringStore, SecretKind, SecretStore};
pub use store::{AuthMode, Db};
pub use term::{CrosstermControl, RawGuard, TermControl};
