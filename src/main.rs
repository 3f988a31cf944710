use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use clap::{Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use log::info;

use hopper::arb::finder::CycleFinder;
use hopper::arb::optimize::TradeSizeOptimizer;
use hopper::bot::{discover_cycles, LoopSettings, MainLoop, Watchlist};
use hopper::config::{Config, MarketFile};
use hopper::exec::dispatcher::ExecutionDispatcher;
use hopper::exec::settlement::ChainSettlement;
use hopper::market::source::{ChainPairSource, PairSource};
use hopper::notify::SlackNotifier;
use hopper::utils::logger::setup_logger;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discovery loop until interrupted (default)
    Run,
    /// Run a single pass and exit
    Once,
    /// Print the cycles of the current snapshot without quoting or submitting
    Cycles,
    /// Send a slack message
    Slack { message: String },
}

/// Builds the loop with a signing provider
fn build_loop(config: &Config, market: &MarketFile) -> Result<MainLoop> {
    let key = config
        .private_key
        .as_deref()
        .ok_or_else(|| eyre!("PRIVATE_KEY must be set to submit"))?;
    let settlement_address = config
        .settlement_address
        .ok_or_else(|| eyre!("SETTLEMENT_ADDRESS must be set to submit"))?;
    let signer: PrivateKeySigner = key.parse().wrap_err("PRIVATE_KEY is not a valid key")?;
    info!("Shared account: {}", signer.address());

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .on_http(config.rpc_url.clone());

    let tokens = market.tokens();
    let decimals = tokens
        .iter()
        .map(|(id, token)| (*id, token.decimals))
        .collect();
    let prices = Arc::new(market.prices());
    let settlement = Arc::new(ChainSettlement::new(provider.clone(), settlement_address));
    let source = Arc::new(ChainPairSource::new(provider, market.pool_specs()));

    let dispatcher = Arc::new(
        ExecutionDispatcher::new(
            settlement.clone(),
            prices.clone(),
            decimals,
            config.dispatcher_config(),
        )
        .with_notifier(SlackNotifier::from_env()?),
    );

    let watchlist = Watchlist {
        tokens,
        pairs: market.pairs(),
        base_tokens: market.base_tokens(),
    };

    Ok(MainLoop::new(
        source,
        settlement,
        prices,
        dispatcher,
        watchlist,
        LoopSettings::from(config),
    ))
}

/// Prints every cycle through the base tokens with its optimal size
async fn print_cycles(config: &Config, market: &MarketFile) -> Result<()> {
    let provider = ProviderBuilder::new().on_http(config.rpc_url.clone());
    let source = ChainPairSource::new(provider, market.pool_specs());
    let snapshot = source.snapshot().await?;

    let finder = CycleFinder::new(config.max_hops);
    let optimizer = TradeSizeOptimizer::default();
    let cycles = discover_cycles(&snapshot, &finder, &optimizer, &market.base_tokens());

    println!(
        "Block {}: {} pools, {} cycles",
        snapshot.block_number,
        snapshot.pools.len(),
        cycles.len()
    );
    for (cycle, trade) in cycles {
        match trade {
            Ok(trade) => println!(
                "{cycle}: in {} out {} profit {}",
                trade.amount_in,
                trade.amount_out,
                trade.profit()
            ),
            Err(e) => println!("{cycle}: {e}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_logger()?;

    let cli = Cli::parse();
    if let Some(Commands::Slack { message }) = &cli.command {
        let notifier = SlackNotifier::from_env()?.ok_or_else(|| eyre!("SLACK_OAUTH_TOKEN must be set"))?;
        return notifier.send(message).await;
    }

    let config = Config::from_env()?;
    let market = MarketFile::load(&config.market_file)?;
    info!(
        "Loaded {} tokens and {} pools from {}",
        market.tokens.len(),
        market.pools.len(),
        config.market_file.display()
    );

    match cli.command {
        Some(Commands::Cycles) => print_cycles(&config, &market).await?,
        Some(Commands::Once) => {
            let mut bot = build_loop(&config, &market)?;
            let summary = bot.run_pass().await?;
            let settled = bot.finish().await;
            println!("{summary}, {settled} outcomes after settlement");
        }
        _ => build_loop(&config, &market)?.run().await?,
    }

    Ok(())
}
