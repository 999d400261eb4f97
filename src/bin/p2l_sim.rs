//! Leasing scenario simulator
//!
//! Replays the reference leasing scenario on an in-memory regtest chain:
//! an owner leases a batch of equal inputs to a leaser, spends one back,
//! watches the leaser fail to spend another, and then lets the leaser produce
//! blocks until every lease has been rewarded once.
//!
//! ```bash
//! cargo run --bin p2l_sim --features cli -- --inputs 20 --input-value 249
//! cargo run --bin p2l_sim --features cli -- --params regtest.json --format json
//! RUST_LOG=p2l_leasing_libs=debug cargo run --bin p2l_sim --features cli
//! ```

use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use p2l_leasing_libs::chain::{ChainBuilder, ChainState};
use p2l_leasing_libs::data_structures::{Amount, RewardSource};
use p2l_leasing_libs::events::listeners::{MemoryEventListener, TracingEventListener};
use p2l_leasing_libs::params::{regtest_spork_key, ConsensusParams};
use p2l_leasing_libs::sporks::{SporkId, SporkMessage};
use p2l_leasing_libs::wallet::{LeaseOptions, Wallet, WalletInfo};
use p2l_leasing_libs::{LeasingError, LeasingResult};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[arg(long, default_value = "20", help = "Number of leases the owner creates")]
    inputs: usize,

    #[arg(long, default_value = "249", help = "Value of each lease in coins")]
    input_value: String,

    #[arg(long, help = "JSON file with consensus parameters (defaults to regtest)")]
    params: Option<PathBuf>,

    #[arg(long, default_value = "42", help = "Seed for wallet keys")]
    seed: u64,

    #[arg(long, default_value = "200", help = "Stop after this many leaser blocks")]
    max_blocks: u64,

    #[arg(
        long,
        default_value = "summary",
        help = "Output format: summary, json"
    )]
    format: String,

    #[arg(short, long, help = "Log every lease transition")]
    verbose: bool,

    #[arg(short, long, help = "Quiet mode - only show the final result")]
    quiet: bool,
}

#[derive(Debug, Serialize)]
struct ScenarioReport {
    height: u64,
    leases_created: usize,
    leases_remaining: usize,
    leaser_spend_rejection: Option<String>,
    blocks_without_rewards: u64,
    blocks_with_rewards: u64,
    leasee_rewards: usize,
    leasee_reward_total: Amount,
    leaser_rewards: usize,
    leaser_reward_total: Amount,
    owner: WalletInfo,
    leaser: WalletInfo,
}

fn activate_sporks(chain: &ChainState, rng: &mut StdRng) -> LeasingResult<()> {
    let key = regtest_spork_key();
    for (offset, id) in SporkId::ALL.into_iter().enumerate() {
        let message = SporkMessage::sign(&key, id, true, 1 + offset as u64, rng)?;
        chain.apply_spork(&message)?;
        info!(spork = %id, "Spork activated");
    }
    Ok(())
}

fn run(args: &CliArgs) -> LeasingResult<ScenarioReport> {
    let params = match &args.params {
        Some(path) => ConsensusParams::from_json_file(path)?,
        None => ConsensusParams::regtest(),
    };
    let input_value = Amount::from_decimal_str(&args.input_value)?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let events = MemoryEventListener::new();
    let handle = events.handle();
    let tracer = if args.verbose {
        TracingEventListener::verbose()
    } else {
        TracingEventListener::new()
    };
    let mut chain = ChainBuilder::new()
        .with_params(params)
        .with_event_listener(Box::new(events))
        .with_event_listener(Box::new(tracer))
        .build()
        .map_err(|e| LeasingError::Wallet(e.to_string()))?;

    let mut owner = Wallet::from_seed(args.seed);
    let mut leaser = Wallet::from_seed(args.seed.wrapping_add(1));
    let leaser_address = leaser.get_new_leasing_address();
    let owner_address = owner.get_new_address().to_base58();

    for _ in 0..=args.inputs {
        let address = owner.get_new_address();
        chain.generate_block(address.hash, false)?;
    }
    activate_sporks(&chain, &mut rng)?;

    let leaser_address = leaser_address.to_base58();
    for _ in 0..args.inputs {
        owner.lease_to_address(
            &mut chain,
            &leaser_address,
            input_value,
            Some(&owner_address),
            LeaseOptions::default(),
        )?;
    }
    let leaser_hash = leaser_address
        .parse::<p2l_leasing_libs::Address>()?
        .hash;
    chain.generate_block(leaser_hash, true)?;
    info!(leases = owner.list_leasing_utxos(&chain, false).len(), "Leases confirmed");

    let leases = owner.list_leasing_utxos(&chain, false);
    if let Some(first) = leases.first() {
        let outpoint = p2l_leasing_libs::OutPoint::new(first.txid, first.vout);
        owner.spend_outputs(&mut chain, &[outpoint], None)?;
        chain.generate_block(leaser_hash, true)?;
        info!(outpoint = %outpoint, "Owner spent a lease back");
    }

    let mut leaser_spend_rejection = None;
    if let Some(lease) = leaser.list_leasing_utxos(&chain, false).first() {
        let outpoint = p2l_leasing_libs::OutPoint::new(lease.txid, lease.vout);
        match leaser.spend_outputs(&mut chain, &[outpoint], None) {
            Err(e @ LeasingError::UnauthorizedSpend { .. }) => {
                info!(error = %e, "Leaser spend rejected");
                leaser_spend_rejection = Some(e.to_string());
            }
            Err(e) => return Err(e),
            Ok(txid) => warn!(txid = %txid, "Leaser spend was accepted"),
        }
    }

    let leases_remaining = owner.list_leasing_utxos(&chain, false).len();
    let mut blocks_without_rewards = 0;
    let mut blocks_with_rewards = 0;
    let mut rewarded = 0usize;
    for _ in 0..args.max_blocks {
        if rewarded >= leases_remaining {
            break;
        }
        let block = chain.generate_block(leaser_hash, true)?;
        let leasee_entries = block
            .rewards
            .entries
            .iter()
            .filter(|entry| matches!(entry.source, RewardSource::Lease(_)))
            .count();
        if leasee_entries == 0 {
            blocks_without_rewards += 1;
        } else {
            blocks_with_rewards += 1;
            rewarded += leasee_entries;
        }
    }

    let mut report = ScenarioReport {
        height: chain.height(),
        leases_created: args.inputs,
        leases_remaining,
        leaser_spend_rejection,
        blocks_without_rewards,
        blocks_with_rewards,
        leasee_rewards: 0,
        leasee_reward_total: Amount::ZERO,
        leaser_rewards: 0,
        leaser_reward_total: Amount::ZERO,
        owner: owner.get_wallet_info(&chain),
        leaser: leaser.get_wallet_info(&chain),
    };
    for event in handle.events_of_type("RewardGranted") {
        if let p2l_leasing_libs::events::LeasingEvent::RewardGranted { reward, .. } = event {
            match reward.source {
                RewardSource::Lease(_) => {
                    report.leasee_rewards += 1;
                    report.leasee_reward_total += reward.reward_amount;
                }
                RewardSource::Leaser(_) => {
                    report.leaser_rewards += 1;
                    report.leaser_reward_total += reward.reward_amount;
                }
            }
        }
    }
    Ok(report)
}

fn print_summary(report: &ScenarioReport) {
    println!("Leasing scenario finished at height {}", report.height);
    println!(
        "  leases created: {}, remaining after spend back: {}",
        report.leases_created, report.leases_remaining
    );
    if let Some(reason) = &report.leaser_spend_rejection {
        println!("  leaser spend rejected: {reason}");
    }
    println!(
        "  blocks without rewards: {}, with rewards: {}",
        report.blocks_without_rewards, report.blocks_with_rewards
    );
    println!(
        "  leasee rewards: {} totalling {}",
        report.leasee_rewards, report.leasee_reward_total
    );
    println!(
        "  leaser rewards: {} totalling {}",
        report.leaser_rewards, report.leaser_reward_total
    );
    println!(
        "  owner leased balance: {}, leaser leasing balance: {}",
        report.owner.balances.leased_balance, report.leaser.balances.leasing_balance
    );
}

fn main() {
    let args = CliArgs::parse();

    let default_filter = if args.quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&args) {
        Ok(report) => {
            if args.format == "json" {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Failed to serialize report: {e}");
                        std::process::exit(1);
                    }
                }
            } else {
                print_summary(&report);
            }
        }
        Err(e) => {
            eprintln!("Scenario failed: {e}");
            std::process::exit(1);
        }
    }
}
