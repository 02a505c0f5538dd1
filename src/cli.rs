//! Command-line interface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Chain, Token};
use crate::error::{Result, RootwatchError};
use crate::types::TxHash;
use crate::watchers::RelayRequest;

#[derive(Parser, Debug)]
#[command(
    name = "rootwatch",
    about = "Commits, bonds, relays and reconciles bridge transfer roots",
    version
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, env = "ROOTWATCH_CONFIG", default_value = "rootwatch.toml")]
    pub config: PathBuf,

    /// Optional .env file loaded before the configuration
    #[arg(long, global = true)]
    pub env: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run every watcher and the status API
    Start(StartArgs),

    /// Commit pending transfers for one route now
    CommitTransfers(CommitTransfersArgs),

    /// Relay stuck L1→L2 messages
    #[command(name = "relay-l1-to-l2-message")]
    RelayL1ToL2Message(RelayArgs),

    /// List committed roots that were never confirmed or bonded
    VerifyCommits(VerifyArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StartArgs {
    /// Decide but never send transactions
    #[arg(long)]
    pub dry: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CommitTransfersArgs {
    #[arg(long)]
    pub source_chain: Option<Chain>,

    #[arg(long)]
    pub destination_chain: Option<Chain>,

    #[arg(long)]
    pub token: Option<Token>,

    #[arg(long)]
    pub dry: bool,
}

impl CommitTransfersArgs {
    /// Source chain, destination chain and token, all required
    pub fn validate(&self) -> Result<(Chain, Chain, Token)> {
        let source = self
            .source_chain
            .ok_or_else(|| RootwatchError::validation("source chain is required"))?;
        let destination = self
            .destination_chain
            .ok_or_else(|| RootwatchError::validation("destination chain is required"))?;
        let token = self
            .token
            .ok_or_else(|| RootwatchError::validation("token is required"))?;

        if source == destination {
            return Err(RootwatchError::validation(
                "source and destination chain must differ",
            ));
        }

        Ok((source, destination, token))
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RelayArgs {
    #[arg(long)]
    pub chain: Option<Chain>,

    #[arg(long)]
    pub token: Option<Token>,

    /// Comma-separated origin transaction hashes
    #[arg(long, value_delimiter = ',')]
    pub tx_hashes: Vec<TxHash>,

    /// Message to relay within the transaction; only valid with one hash
    #[arg(long)]
    pub message_index: Option<u32>,

    #[arg(long)]
    pub dry: bool,
}

impl RelayArgs {
    pub fn to_request(&self) -> Result<RelayRequest> {
        RelayRequest::new(
            self.chain,
            self.token,
            self.tx_hashes.clone(),
            self.message_index,
        )
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct VerifyArgs {
    #[arg(long)]
    pub chain: Chain,

    #[arg(long)]
    pub token: Token,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["rootwatch"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_start_dry() {
        let cli = parse(&["--config", "prod.toml", "start", "--dry"]);
        assert_eq!(cli.config, PathBuf::from("prod.toml"));
        assert_eq!(cli.command, Command::Start(StartArgs { dry: true }));
    }

    #[test]
    fn test_commit_transfers() {
        let cli = parse(&[
            "commit-transfers",
            "--source-chain",
            "optimism",
            "--destination-chain",
            "ethereum",
            "--token",
            "USDC",
        ]);

        let Command::CommitTransfers(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(
            args.validate().unwrap(),
            (Chain::Optimism, Chain::Ethereum, Token::Usdc)
        );
    }

    #[test]
    fn test_commit_transfers_requires_source() {
        let cli = parse(&["commit-transfers", "--destination-chain", "ethereum", "--token", "usdc"]);
        let Command::CommitTransfers(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(
            args.validate().unwrap_err().to_string(),
            "Validation error: source chain is required"
        );
    }

    #[test]
    fn test_relay_hash_list() {
        let a = format!("0x{}", "11".repeat(32));
        let b = format!("0x{}", "22".repeat(32));
        let hashes = format!("{},{}", a, b);
        let cli = parse(&[
            "relay-l1-to-l2-message",
            "--chain",
            "arbitrum",
            "--token",
            "ETH",
            "--tx-hashes",
            &hashes,
        ]);

        let Command::RelayL1ToL2Message(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.tx_hashes.len(), 2);

        let request = args.to_request().unwrap();
        assert_eq!(request.message_index, None);
    }

    #[test]
    fn test_relay_index_with_many_hashes_rejected() {
        let hashes = format!("0x{},0x{}", "11".repeat(32), "22".repeat(32));
        let cli = parse(&[
            "relay-l1-to-l2-message",
            "--chain",
            "arbitrum",
            "--token",
            "ETH",
            "--tx-hashes",
            &hashes,
            "--message-index",
            "1",
        ]);

        let Command::RelayL1ToL2Message(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert!(args.to_request().is_err());
    }

    #[test]
    fn test_unknown_chain_rejected_by_parser() {
        let result = Cli::try_parse_from(["rootwatch", "verify-commits", "--chain", "fantom", "--token", "USDC"]);
        assert!(result.is_err());
    }
}
