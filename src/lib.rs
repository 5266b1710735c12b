// advisor-client: retrying HTTP client for the student advising API
// Exposes the retry core, the HTTP facade and the CLI as a library

pub mod backoff;
pub mod cli;
pub mod credentials;
pub mod error;
pub mod http;
pub mod policy;
pub mod retry;
pub mod state;
