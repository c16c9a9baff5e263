// 同階層のファイルをモジュールとしてインポート
pub mod bootstrap; // config → corpus → tools → model → relay
pub mod config;
pub mod corpus;
pub mod error;
pub mod llm; // hosted model adapters (Gemini / OpenAI)
pub mod logging;
pub mod profile;
pub mod prompts;
pub mod relay;
pub mod tools;
pub mod web;

pub use config::{ModelProvider, RelayConfig};
pub use corpus::{Corpus, ReferenceDocument};
pub use error::{LookupError, RelayError, StartupError, ToolError, UpstreamError};
pub use profile::UserProfile;
pub use relay::{Session, SessionRelay, SessionStore, TurnOutcome};

// Ensure .env is loaded for tests before anything else runs in the test process.
#[cfg(test)]
#[ctor::ctor]
fn load_dotenv_for_tests() {
    let _ = dotenvy::dotenv();
}
