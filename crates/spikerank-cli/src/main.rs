//! spikerank: score intraday continuation candidates per cutoff, build the
//! offline regime prior, and reconcile a day's snapshots.
//!
//! Usage:
//!   spikerank scan --date 2025-08-27 --cutoff 09:30 --cutoff 14:15
//!   spikerank scan --cutoff "09:30,11:30,14:15"      # date auto-detected
//!   spikerank build-prior --daily-dir data/cache_daily
//!   spikerank recon --date 2025-08-27

use anyhow::{bail, Context, Result};
use cache_store::{atomic_write_csv, snapshot_filename, CacheLayout, OhlcvCache};
use chain_blender::{ChainBlender, ScoredRow, SCORED_HEADERS};
use chrono::NaiveDate;
use feature_engine::FeatureEngine;
use recommender::Recommender;
use regime_prior::{
    build_decile_edges, build_prior_table, latest_daily_stats, DailyStats, DecileEdges,
    GapBucket, PriorTable,
};
use scan_core::{Resolution, ScanConfig, Slot};
use slot_recon::SlotRecon;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spikerank=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("scan") => run_scan(&args),
        Some("build-prior") => run_build_prior(&args),
        Some("recon") => run_recon(&args),
        _ => {
            eprintln!("Usage:");
            eprintln!("  spikerank scan [--date YYYY-MM-DD] [--cutoff HH:MM]...");
            eprintln!("                 [--top N] [--baseline-days N] [--pace-min F]");
            eprintln!("                 [--ret-min F] [--ret-max F] [--min-price F]");
            eprintln!("                 [--data-root DIR] [--src-1m DIR] [--src-5m DIR]");
            eprintln!("                 [--src-15m DIR] [--src-daily DIR]");
            eprintln!("                 [--artifacts DIR] [--out-dir DIR]");
            eprintln!("  spikerank build-prior [--daily-dir DIR] [--artifacts DIR]");
            eprintln!("  spikerank recon --date YYYY-MM-DD [--input-dir DIR] [--out-dir DIR]");
            std::process::exit(1);
        }
    }
}

/// Value of `--name VALUE`, if present.
fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .filter(|v| !v.starts_with("--"))
        .cloned()
}

/// All values of a repeatable flag.
fn flag_values(args: &[String], name: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if arg == name {
            if let Some(v) = args.get(i + 1) {
                if !v.starts_with("--") {
                    out.push(v.clone());
                }
            }
        }
    }
    out
}

fn parse_flag<T: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<T>> {
    match flag_value(args, name) {
        Some(raw) => match raw.parse() {
            Ok(v) => Ok(Some(v)),
            Err(_) => bail!("invalid value '{raw}' for {name}"),
        },
        None => Ok(None),
    }
}

/// Directory resolution order: CLI flag, environment variable, default.
fn resolve_dir(cli: Option<String>, env: &str, default: PathBuf) -> PathBuf {
    if let Some(dir) = cli {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var(env) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    default
}

fn resolve_layout(args: &[String]) -> CacheLayout {
    let root = resolve_dir(
        flag_value(args, "--data-root"),
        "SPIKERANK_DATA_ROOT",
        PathBuf::from("data"),
    );
    let defaults = CacheLayout::under(&root);
    CacheLayout {
        min1: resolve_dir(flag_value(args, "--src-1m"), "SPIKERANK_1M_DIR", defaults.min1),
        min5: resolve_dir(flag_value(args, "--src-5m"), "SPIKERANK_5M_DIR", defaults.min5),
        min15: resolve_dir(
            flag_value(args, "--src-15m"),
            "SPIKERANK_15M_DIR",
            defaults.min15,
        ),
        daily: resolve_dir(
            flag_value(args, "--src-daily"),
            "SPIKERANK_DAILY_DIR",
            defaults.daily,
        ),
    }
}

fn resolve_artifacts(args: &[String]) -> PathBuf {
    resolve_dir(
        flag_value(args, "--artifacts"),
        "SPIKERANK_ARTIFACTS_DIR",
        PathBuf::from("artifacts"),
    )
}

fn resolve_out_dir(args: &[String]) -> PathBuf {
    resolve_dir(
        flag_value(args, "--out-dir"),
        "SPIKERANK_OUT_DIR",
        PathBuf::from("output"),
    )
}

fn scan_config(args: &[String]) -> Result<ScanConfig> {
    let mut cfg = ScanConfig::default();
    if let Some(v) = parse_flag(args, "--top")? {
        cfg.top_n = v;
    }
    if let Some(v) = parse_flag(args, "--baseline-days")? {
        cfg.baseline_days = v;
    }
    if let Some(v) = parse_flag(args, "--pace-min")? {
        cfg.pace_min = v;
    }
    if let Some(v) = parse_flag(args, "--ret-min")? {
        cfg.ret_min = v;
    }
    if let Some(v) = parse_flag(args, "--ret-max")? {
        cfg.ret_max = v;
    }
    cfg.min_price = parse_flag(args, "--min-price")?;
    Ok(cfg)
}

/// Cutoff list: repeatable `--cutoff` flags, each possibly comma-separated.
fn cutoffs(args: &[String]) -> Result<Vec<Slot>> {
    let raw = flag_values(args, "--cutoff");
    if raw.is_empty() {
        return Ok(vec![Slot::parse("09:30")?]);
    }
    let mut slots = Vec::new();
    for item in raw {
        for part in item.split(',') {
            let part = part.trim();
            if !part.is_empty() {
                slots.push(Slot::parse(part)?);
            }
        }
    }
    Ok(slots)
}

/// Tickers present in snapshots of earlier same-day slots already on disk.
fn earlier_slot_tickers(
    out_dir: &Path,
    date: NaiveDate,
    current: Slot,
) -> Result<Vec<HashSet<String>>> {
    let mut sets = Vec::new();
    let Ok(entries) = std::fs::read_dir(out_dir) else {
        return Ok(sets);
    };
    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(|s| s.to_string()) else {
            continue;
        };
        if let Some((file_date, hhmm)) = cache_store::parse_snapshot_filename(&name) {
            if file_date == date && hhmm < current.hhmm() {
                let rows = cache_store::read_snapshot(&entry.path())?;
                sets.push(rows.into_iter().map(|r| r.ticker).collect());
            }
        }
    }
    Ok(sets)
}

fn run_scan(args: &[String]) -> Result<()> {
    let cfg = scan_config(args)?;
    let layout = resolve_layout(args);
    let artifacts = resolve_artifacts(args);
    let out_dir = resolve_out_dir(args);
    std::fs::create_dir_all(&out_dir)?;

    let prior_path = artifacts.join("prior_transition.csv");
    let edges_path = artifacts.join("deciles.json");
    let prior = PriorTable::load_csv(&prior_path)
        .with_context(|| format!("{} (run `spikerank build-prior` first)", prior_path.display()))?;
    let edges = DecileEdges::load(&edges_path)
        .with_context(|| format!("{} (run `spikerank build-prior` first)", edges_path.display()))?;

    let cache = OhlcvCache::new(layout);
    let engine = FeatureEngine::new(cache, cfg.clone());
    let blender = ChainBlender::new(cfg.blend.clone());
    let ranker = Recommender::new(cfg.guards.clone());

    let today = chrono::Local::now().date_naive();
    let date = match flag_value(args, "--date") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("invalid --date '{raw}'"))?,
        None => engine.latest_session(today).unwrap_or(today),
    };
    let slots = cutoffs(args)?;
    tracing::info!(%date, cutoffs = %slots.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", "), "scan starting");

    for slot in slots {
        let (mut candidates, drops) = engine.extract_universe(date, slot);

        if let Some(floor) = cfg.min_price {
            let before = candidates.len();
            candidates.retain(|c| c.last > floor || c.price_at_cutoff > floor);
            tracing::info!(
                slot = %slot,
                floor,
                removed = before - candidates.len(),
                "applied price floor"
            );
        }

        candidates.truncate(cfg.top_n);

        // persistence across earlier cutoffs already written today
        let earlier = earlier_slot_tickers(&out_dir, date, slot)?;
        for row in &mut candidates {
            let seen_before = earlier.iter().filter(|s| s.contains(&row.ticker)).count();
            row.persist_count = 1 + seen_before as u32;
        }

        let mut scored: Vec<ScoredRow> = candidates
            .iter()
            .map(|row| {
                let stats = engine
                    .cache()
                    .load(Resolution::Daily, &row.ticker)
                    .map(|s| latest_daily_stats(&s))
                    .unwrap_or_else(DailyStats::default);
                let liq = edges.bucket_turnover(stats.turnover);
                let vol = edges.bucket_atr14(stats.atr14);
                let gap = GapBucket::from_gap(stats.gap, cfg.gap_flat_band);
                let triple = prior.get_prior(&cfg.sector_default, liq, vol, gap);
                blender.score(row, &triple, liq, vol, gap)
            })
            .collect();

        ranker.rank(&mut scored);

        let out_path = out_dir.join(snapshot_filename(date, slot));
        atomic_write_csv(&out_path, SCORED_HEADERS, &scored)?;
        tracing::info!(slot = %slot, rows = scored.len(), path = %out_path.display(), "snapshot written");

        for row in scored.iter().take(cfg.top_n.min(10)) {
            tracing::info!(
                ticker = %row.ticker,
                p_chain = %format!("{:.3}", row.p_chain),
                pace = %format!("{:.2}x", row.vol_pace),
                label = %row.recommendation,
                "candidate"
            );
        }
        if !drops.is_empty() {
            for (reason, count) in drops.most_common().into_iter().take(8) {
                tracing::info!(%reason, count, "drop summary");
            }
        }
    }
    Ok(())
}

fn run_build_prior(args: &[String]) -> Result<()> {
    let cfg = ScanConfig::default();
    let daily_dir = match flag_value(args, "--daily-dir") {
        Some(dir) => PathBuf::from(dir),
        None => resolve_layout(args).daily,
    };
    let artifacts = resolve_artifacts(args);
    std::fs::create_dir_all(&artifacts)?;

    let edges = build_decile_edges(&daily_dir)
        .with_context(|| format!("learning decile edges from {}", daily_dir.display()))?;
    let edges_path = artifacts.join("deciles.json");
    edges.save(&edges_path)?;
    tracing::info!(path = %edges_path.display(), "decile edges saved");

    let table = build_prior_table(&daily_dir, &edges, &cfg)
        .with_context(|| format!("building prior from {}", daily_dir.display()))?;
    let prior_path = artifacts.join("prior_transition.csv");
    table.save_csv(&prior_path)?;
    tracing::info!(
        path = %prior_path.display(),
        regimes = table.len(),
        "transition prior saved"
    );
    Ok(())
}

fn run_recon(args: &[String]) -> Result<()> {
    let cfg = ScanConfig::default();
    let date_raw =
        flag_value(args, "--date").context("recon requires --date YYYY-MM-DD")?;
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
        .with_context(|| format!("invalid --date '{date_raw}'"))?;
    let input_dir = match flag_value(args, "--input-dir") {
        Some(dir) => PathBuf::from(dir),
        None => resolve_out_dir(args),
    };
    let out_dir = resolve_out_dir(args);

    let recon = SlotRecon::new(cfg.slots.clone());
    let generated_at = chrono::Local::now().to_rfc3339();
    let outcome = recon.build(&input_dir, &out_dir, date, &generated_at)?;

    let summary = serde_json::json!({
        "status": "ok",
        "date": date.to_string(),
        "long_rows": outcome.long_rows,
        "snapshots_present": outcome.snapshots_present,
        "ready_for": outcome.ready_for,
        "manifest": outcome.manifest_path.to_string_lossy(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
