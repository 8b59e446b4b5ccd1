use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: f64,
    },
    /// Mine the pending transactions
    Mine {
        /// Address that receives the mining reward
        #[arg(long)]
        miner: String,
    },
    /// Print the whole chain
    Chain,
    /// Print one block
    Block {
        index: i64,
    },
    /// Check hashes, links and proof-of-work of every block
    Validate,
    /// Balance of an address
    Balance {
        address: String,
    },
    /// Transactions waiting to be mined
    Pending,
    /// Chain and store statistics
    Stats,
    /// Discard the chain and start from a new genesis block
    Reset,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: f64,
}

#[derive(Serialize)]
struct MineReq {
    miner_address: String,
}

#[derive(Serialize)]
struct BalanceReq {
    address: String,
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<(reqwest::StatusCode, Value)> {
        let res = self
            .http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        Self::read(res).await
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<(reqwest::StatusCode, Value)> {
        let mut req = self.http.post(format!("{}{path}", self.base));
        if let Some(body) = body {
            req = req.json(body);
        }
        let res = req.send().await.with_context(|| format!("POST {path}"))?;
        Self::read(res).await
    }

    async fn read(res: reqwest::Response) -> Result<(reqwest::StatusCode, Value)> {
        let status = res.status();
        let body = res.text().await?;
        debug!("response body: {body}");
        let json = serde_json::from_str(&body).unwrap_or(Value::String(body));
        Ok((status, json))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.node);
    let (status, body) = match cli.cmd {
        Command::Submit { from, to, amount } => {
            let tx = Tx {
                sender: from,
                recipient: to,
                amount,
            };
            client.post("/api/transaction", Some(&tx)).await?
        }
        Command::Mine { miner } => {
            let req = MineReq {
                miner_address: miner,
            };
            client.post("/api/mine", Some(&req)).await?
        }
        Command::Chain => client.get("/api/chain").await?,
        Command::Block { index } => client.get(&format!("/api/block/{index}")).await?,
        Command::Validate => client.get("/api/chain/validate").await?,
        Command::Balance { address } => {
            client
                .post("/api/balance", Some(&BalanceReq { address }))
                .await?
        }
        Command::Pending => client.get("/api/transactions/pending").await?,
        Command::Stats => client.get("/api/stats").await?,
        Command::Reset => client.post::<Value>("/api/reset", None).await?,
    };

    println!("status: {}", status);
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submit() {
        let cli = Cli::parse_from([
            "ledger-cli", "submit", "--from", "Alice", "--to", "Bob", "--amount", "50",
        ]);
        match cli.cmd {
            Command::Submit { from, to, amount } => {
                assert_eq!(from, "Alice");
                assert_eq!(to, "Bob");
                assert_eq!(amount, 50.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn node_flag_is_global() {
        let cli = Cli::parse_from(["ledger-cli", "block", "3", "--node", "http://example:9000/"]);
        assert!(matches!(cli.cmd, Command::Block { index: 3 }));
        assert_eq!(Client::new(&cli.node).base, "http://example:9000");
    }
}
