use clap::{ArgAction, Parser};
use tracing::info;

use crate::{
    cerebras::{
        chat::ChatSession,
        client::{CerebrasClient, CerebrasModel, Result, SamplingParams},
    },
    config::SessionConfig,
    repl::{ChatRepl, SessionError},
};

/// Chat with a Cerebras-hosted model from the terminal.
///
/// Without PROMPT an interactive session starts; type `exit` to leave.
/// The API key is read from CEREBRAS_API_KEY.
#[derive(Parser, Debug)]
#[clap(name = "cerebras-chat", version)]
pub struct Cli {
    #[clap(short = 'm', long = "model", default_value = "llama3.1-8b")]
    model: CerebrasModel,
    #[clap(long = "temperature")]
    temperature: Option<f32>,
    #[clap(long = "max-tokens")]
    max_tokens: Option<u32>,
    #[clap(long = "seed")]
    seed: Option<u64>,
    #[clap(long = "top-p")]
    top_p: Option<f32>,
    /// Chat completions endpoint, overriding the public Cerebras API.
    #[clap(long = "api-url")]
    api_url: Option<String>,
    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Send a single message, print the reply and exit.
    prompt: Option<String>,
}

impl Cli {
    pub fn new() -> Self {
        Self::parse()
    }
    pub fn verbose(&self) -> u8 {
        self.verbose
    }
    pub fn run(&self) -> std::result::Result<(), SessionError> {
        let config = self.session_config()?;
        info!(model = %config.model, url = config.option.url(), "session configured");
        let client = CerebrasClient::new(&config)?;
        match &self.prompt {
            Some(prompt) => {
                let mut session = ChatSession::new(client);
                println!("{}", session.send(prompt.as_str())?);
                Ok(())
            }
            None => ChatRepl::stdio(client).repl(),
        }
    }
    pub fn session_config(&self) -> Result<SessionConfig> {
        SessionConfig::from_env().map(|config| self.configure(config))
    }
    fn configure(&self, config: SessionConfig) -> SessionConfig {
        let mut config = config
            .with_model(self.model)
            .with_params(self.sampling_params());
        if let Some(url) = &self.api_url {
            config.option = config.option.with_url(url.as_str());
        }
        config
    }
    fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            seed: self.seed,
            top_p: self.top_p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cerebras::client::{CerebrasClientErrorKind, CerebrasKey};

    fn with_key(name: &str) -> Option<String> {
        (name == "CEREBRAS_API_KEY").then(|| "csk-test".to_string())
    }

    #[test]
    fn 引数なしの場合はデフォルトの設定で対話する() {
        let cli = Cli::parse_from(["cerebras-chat"]);

        let config = cli.configure(SessionConfig::from_lookup(with_key).unwrap());

        assert_eq!(cli.prompt, None);
        assert_eq!(cli.verbose(), 0);
        assert_eq!(config.key, CerebrasKey::new("csk-test"));
        assert_eq!(config.model, CerebrasModel::Llama3Dot1_8b);
        assert_eq!(config.params, SamplingParams::default());
        assert_eq!(config.option.url(), CerebrasClient::URL);
    }
    #[test]
    fn cliのoptionからsession_configを生成できる() {
        let cli = Cli::parse_from([
            "cerebras-chat",
            "-m",
            "llama-3.3-70b",
            "--temperature",
            "0.2",
            "--max-tokens",
            "512",
            "--seed",
            "7",
            "--top-p",
            "1",
            "--api-url",
            "http://localhost:8080/v1/chat/completions",
            "-vv",
        ]);

        let config = cli.configure(SessionConfig::from_lookup(with_key).unwrap());

        assert_eq!(cli.verbose(), 2);
        assert_eq!(config.model, CerebrasModel::Llama3Dot3_70b);
        assert_eq!(
            config.params,
            SamplingParams {
                temperature: Some(0.2),
                max_tokens: Some(512),
                seed: Some(7),
                top_p: Some(1.0),
            }
        );
        assert_eq!(
            config.option.url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }
    #[test]
    fn promptを渡すとワンショットで実行する() {
        let cli = Cli::parse_from(["cerebras-chat", "Hello!"]);

        assert_eq!(cli.prompt.as_deref(), Some("Hello!"));
    }
    #[test]
    fn 未対応のmodelはエラーになる() {
        assert!(Cli::try_parse_from(["cerebras-chat", "-m", "gpt-4"]).is_err());
    }
    #[test]
    fn api_keyがない場合は設定の段階で失敗する() {
        let err = SessionConfig::from_lookup(|_| None).unwrap_err();

        assert_eq!(err.kind, CerebrasClientErrorKind::NotFoundEnvAPIKey);
    }
}
