use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cprx_ledger::auth::{address_of, SignedCall};
use cprx_ledger::store::StateFile;
use cprx_ledger::{CallReceipt, Token, TokenCall};

#[derive(Parser)]
#[command(name = "cprx", version, about = "Crypto Perx (CPRX) token ledger")]
struct Cli {
    /// JSON state file holding the deployed token
    #[arg(long, global = true, env = "CPRX_STATE", default_value = "cprx-state.json")]
    state: PathBuf,

    /// Debug-level logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mint the full supply to --wallet and record --owner
    Deploy {
        #[arg(long, value_parser = parse_address)]
        owner: Address,
        #[arg(long, value_parser = parse_address)]
        wallet: Address,
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },
    /// Token metadata, supply and state root
    Info,
    Owner,
    Balance {
        #[arg(value_parser = parse_address)]
        holder: Address,
    },
    Allowance {
        #[arg(value_parser = parse_address)]
        owner: Address,
        #[arg(value_parser = parse_address)]
        spender: Address,
    },
    /// Print the event log, one JSON record per line
    Events {
        #[arg(long)]
        limit: Option<usize>,
    },
    Transfer {
        #[arg(long, value_parser = parse_address)]
        caller: Address,
        #[arg(long, value_parser = parse_address)]
        to: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: U256,
    },
    Approve {
        #[arg(long, value_parser = parse_address)]
        caller: Address,
        #[arg(long, value_parser = parse_address)]
        spender: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: U256,
    },
    TransferFrom {
        #[arg(long, value_parser = parse_address)]
        caller: Address,
        #[arg(long, value_parser = parse_address)]
        owner: Address,
        #[arg(long, value_parser = parse_address)]
        to: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: U256,
    },
    IncreaseAllowance {
        #[arg(long, value_parser = parse_address)]
        caller: Address,
        #[arg(long, value_parser = parse_address)]
        spender: Address,
        #[arg(long, value_parser = parse_amount)]
        added: U256,
    },
    DecreaseAllowance {
        #[arg(long, value_parser = parse_address)]
        caller: Address,
        #[arg(long, value_parser = parse_address)]
        spender: Address,
        #[arg(long, value_parser = parse_amount)]
        subtracted: U256,
    },
    Burn {
        #[arg(long, value_parser = parse_address)]
        caller: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: U256,
    },
    BurnFrom {
        #[arg(long, value_parser = parse_address)]
        caller: Address,
        #[arg(long, value_parser = parse_address)]
        holder: Address,
        #[arg(long, value_parser = parse_amount)]
        amount: U256,
    },
    /// Generate an ed25519 keypair and its ledger address
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Ledger address of a 32-byte ed25519 public key
    AddressOf {
        #[arg(long)]
        pk_hex: String,
    },
    /// Sign a JSON call, e.g. '{"type":"burn","amount":"1000"}'
    Sign {
        #[arg(long)]
        sk_hex: String,
        #[arg(long)]
        call: String,
        /// Random when omitted
        #[arg(long)]
        nonce: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify and apply a signed call file
    Submit { signed: PathBuf },
    /// Recompute the state root and supply of the state file
    VerifyState,
}

fn parse_address(s: &str) -> Result<Address, String> {
    s.trim()
        .parse::<Address>()
        .map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn parse_amount(s: &str) -> Result<U256, String> {
    s.trim()
        .parse::<U256>()
        .map_err(|e| format!("invalid amount {s:?}: {e}"))
}

fn parse_sk_hex(sk_hex: &str) -> Result<SigningKey> {
    let bytes = hex::decode(sk_hex.trim()).context("invalid sk-hex")?;
    let sk: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("sk-hex must be 32 bytes (64 hex chars)"))?;
    Ok(SigningKey::from_bytes(&sk))
}

fn load_token(state: &Path) -> Result<(StateFile, Token)> {
    let file =
        StateFile::load(state).with_context(|| format!("loading {}", state.display()))?;
    let token = file
        .to_token()
        .with_context(|| format!("restoring {}", state.display()))?;
    Ok((file, token))
}

fn print_receipt(receipt: &CallReceipt) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(receipt)?);
    Ok(())
}

//==================== commands ====================//

fn deploy_cmd(state: &Path, owner: Address, wallet: Address, force: bool) -> Result<()> {
    if state.exists() && !force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            state.display()
        );
    }
    let token = Token::deploy(owner, wallet)?;
    StateFile::from_token(&token).save(state)?;
    println!("deployed {} ({}) → {}", token.name(), token.symbol(), state.display());
    println!("owner:  {}", token.owner());
    println!("wallet: {wallet}");
    println!("supply: {}", token.total_supply());
    Ok(())
}

fn info_cmd(state: &Path) -> Result<()> {
    let (_, token) = load_token(state)?;
    println!("name:         {}", token.name());
    println!("symbol:       {}", token.symbol());
    println!("decimals:     {}", token.decimals());
    println!("total supply: {}", token.total_supply());
    println!("owner:        {}", token.owner());
    println!("holders:      {}", token.ledger().holders().count());
    println!("state root:   {}", token.ledger().state_root());
    Ok(())
}

fn events_cmd(state: &Path, limit: Option<usize>) -> Result<()> {
    let (_, token) = load_token(state)?;
    let events = token.ledger().events();
    let skip = limit.map_or(0, |n| events.len().saturating_sub(n));
    for event in &events[skip..] {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

fn call_cmd(state: &Path, caller: Address, call: TokenCall) -> Result<()> {
    let (mut file, mut token) = load_token(state)?;
    let receipt = token.execute(caller, &call).map_err(|err| {
        warn!(%caller, call = call.name(), %err, "call rejected");
        err
    })?;
    file.update(&token);
    file.save(state)?;
    print_receipt(&receipt)
}

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).context("mkdir out-dir")?;

    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let pk = sk.verifying_key();
    let address = address_of(&pk);

    fs::write(out_dir.join("sk.hex"), hex::encode(sk_bytes))?;
    fs::write(out_dir.join("pk.hex"), hex::encode(pk.as_bytes()))?;
    fs::write(out_dir.join("address.txt"), address.to_string())?;
    println!("keypair written → {}", out_dir.display());
    println!("address: {address}");
    Ok(())
}

fn address_cmd(pk_hex: &str) -> Result<()> {
    let bytes = hex::decode(pk_hex.trim()).context("invalid pk-hex")?;
    let pk: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("pk-hex must be 32 bytes (64 hex chars)"))?;
    let key = VerifyingKey::from_bytes(&pk).context("pk-hex is not an ed25519 key")?;
    println!("{}", address_of(&key));
    Ok(())
}

fn sign_cmd(sk_hex: &str, call: &str, nonce: Option<u64>, out: Option<&Path>) -> Result<()> {
    let sk = parse_sk_hex(sk_hex)?;
    let call: TokenCall = serde_json::from_str(call).context("parsing --call")?;
    let nonce = nonce.unwrap_or_else(|| OsRng.next_u64());
    let signed = SignedCall::sign(&sk, call, nonce)?;
    let json = serde_json::to_string_pretty(&signed)?;
    match out {
        Some(path) => {
            fs::write(path, json)?;
            println!("signed call → {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn submit_cmd(state: &Path, signed_path: &Path) -> Result<()> {
    let bytes = fs::read(signed_path)
        .with_context(|| format!("reading {}", signed_path.display()))?;
    let signed: SignedCall = serde_json::from_slice(&bytes).context("parsing signed call")?;
    let caller = signed.verify().context("verifying signed call")?;
    let digest = signed.digest()?;

    let (mut file, mut token) = load_token(state)?;
    file.ensure_fresh(digest)?;
    let receipt = token.execute(caller, &signed.call).map_err(|err| {
        warn!(%caller, call = signed.call.name(), %err, "signed call rejected");
        err
    })?;
    file.record_call(digest)?;
    file.update(&token);
    file.save(state)?;
    info!(%caller, %digest, "signed call applied");
    print_receipt(&receipt)
}

fn verify_state_cmd(state: &Path) -> Result<()> {
    let (file, token) = load_token(state)?;
    println!(
        "verify-state: OK (state root {}, supply {}, {} signed calls)",
        token.ledger().state_root(),
        token.total_supply(),
        file.applied_calls.len()
    );
    Ok(())
}

//==================== main ====================//

fn init_logging(verbose: bool) {
    let default = if verbose {
        "cprx=debug,cprx_ledger=debug"
    } else {
        "cprx=info,cprx_ledger=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let Cli { state, command, .. } = cli;
    let state = state.as_path();
    match command {
        Command::Deploy {
            owner,
            wallet,
            force,
        } => deploy_cmd(state, owner, wallet, force),
        Command::Info => info_cmd(state),
        Command::Owner => {
            let (_, token) = load_token(state)?;
            println!("{}", token.owner());
            Ok(())
        }
        Command::Balance { holder } => {
            let (_, token) = load_token(state)?;
            println!("{}", token.balance_of(holder));
            Ok(())
        }
        Command::Allowance { owner, spender } => {
            let (_, token) = load_token(state)?;
            println!("{}", token.allowance(owner, spender));
            Ok(())
        }
        Command::Events { limit } => events_cmd(state, limit),
        Command::Transfer { caller, to, amount } => {
            call_cmd(state, caller, TokenCall::Transfer { to, amount })
        }
        Command::Approve {
            caller,
            spender,
            amount,
        } => call_cmd(state, caller, TokenCall::Approve { spender, amount }),
        Command::TransferFrom {
            caller,
            owner,
            to,
            amount,
        } => call_cmd(state, caller, TokenCall::TransferFrom { owner, to, amount }),
        Command::IncreaseAllowance {
            caller,
            spender,
            added,
        } => call_cmd(state, caller, TokenCall::IncreaseAllowance { spender, added }),
        Command::DecreaseAllowance {
            caller,
            spender,
            subtracted,
        } => call_cmd(
            state,
            caller,
            TokenCall::DecreaseAllowance {
                spender,
                subtracted,
            },
        ),
        Command::Burn { caller, amount } => call_cmd(state, caller, TokenCall::Burn { amount }),
        Command::BurnFrom {
            caller,
            holder,
            amount,
        } => call_cmd(state, caller, TokenCall::BurnFrom { holder, amount }),
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::AddressOf { pk_hex } => address_cmd(&pk_hex),
        Command::Sign {
            sk_hex,
            call,
            nonce,
            out,
        } => sign_cmd(&sk_hex, &call, nonce, out.as_deref()),
        Command::Submit { signed } => submit_cmd(state, &signed),
        Command::VerifyState => verify_state_cmd(state),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
