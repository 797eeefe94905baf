mod composer;

pub use composer::{PromptComposer, realtime_seed};
