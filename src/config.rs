//! Startup configuration.
//!
//! Everything here is resolved once, before the first prompt, and then
//! handed to the client by reference.

use crate::cerebras::client::{
    CerebrasClientOption, CerebrasKey, CerebrasModel, Result, SamplingParams,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub key: CerebrasKey,
    pub model: CerebrasModel,
    pub params: SamplingParams,
    pub option: CerebrasClientOption,
}

impl SessionConfig {
    pub fn new(key: CerebrasKey) -> Self {
        Self {
            key,
            model: CerebrasModel::default(),
            params: SamplingParams::default(),
            option: CerebrasClientOption::default(),
        }
    }

    /// Reads the API key, proxy and CA bundle from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let key = CerebrasKey::from_lookup(&lookup)?;
        Ok(Self::new(key).with_option(CerebrasClientOption::from_lookup(&lookup)))
    }

    pub fn with_model(mut self, model: CerebrasModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_option(mut self, option: CerebrasClientOption) -> Self {
        self.option = option;
        self
    }
}
