pub mod article;
pub mod category;
pub mod dedup;
pub mod digest;
pub mod fetch;
pub mod fingerprint;
pub mod handlers;
pub mod normalize;
pub mod prompts;
pub mod refresh;
pub mod signature;
pub mod sources;
pub mod store;
