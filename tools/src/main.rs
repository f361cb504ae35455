//! settlement-runner: headless cut runner for comisiones-core.
//!
//! Usage:
//!   settlement-runner --periodo 202504 --zona LIMA --cut 1 --db comisiones.db
//!   settlement-runner --periodo 2025-04 --zona LIMA --cut all \
//!       --sales data/sample_sales.json --parameters data/sample_parameters.json \
//!       --export consolidado.csv

use anyhow::{bail, Context, Result};
use comisiones_core::{
    config::EngineConfig,
    consolidation::{self, format_money},
    parameter_store::CommissionParameter,
    sale::SaleRecord,
    settlement_engine::{CutReport, SettlementEngine},
    store::SettlementStore,
    types::{Corte, Periodo, Zona},
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let config_path = string_arg(&args, "--config").unwrap_or("./data/engine_config.json");
    let periodo: Periodo = string_arg(&args, "--periodo")
        .context("--periodo is required")?
        .parse()?;
    let zona: Zona = string_arg(&args, "--zona").unwrap_or("LIMA").parse()?;
    let cut = string_arg(&args, "--cut").unwrap_or("all");
    let sales_path = string_arg(&args, "--sales");
    let parameters_path = string_arg(&args, "--parameters");
    let export_path = string_arg(&args, "--export");

    println!("comisiones: settlement-runner");
    println!("  periodo:   {periodo}");
    println!("  zona:      {zona}");
    println!("  cut:       {cut}");
    println!("  db:        {db}");
    println!("  config:    {config_path}");
    println!();

    let config = EngineConfig::load(config_path)?;

    // For :memory: use a shared-memory URI so the database is named per run.
    let db_effective: String = if db == ":memory:" {
        format!("file:comisiones_{}?mode=memory&cache=shared", unix_secs())
    } else {
        db.to_string()
    };
    let store = SettlementStore::open(&db_effective)?;
    store.migrate()?;

    if let Some(path) = sales_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading sales from {path}"))?;
        let records: Vec<SaleRecord> =
            serde_json::from_str(&raw).with_context(|| format!("parsing sales in {path}"))?;
        let n = store.upsert_sales(&records)?;
        log::info!("loaded {n} sale records from {path}");
    }
    if let Some(path) = parameters_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameters from {path}"))?;
        let rows: Vec<CommissionParameter> =
            serde_json::from_str(&raw).with_context(|| format!("parsing parameters in {path}"))?;
        let n = store.insert_parameters(&rows)?;
        log::info!("loaded {n} commission parameters from {path}");
    }

    let engine = SettlementEngine::new(store, config);
    let reports = match cut {
        "all" => engine.run_all(periodo, zona)?,
        n => {
            let number: u8 = n.parse().with_context(|| format!("invalid --cut {n}"))?;
            let corte = Corte::try_from(number)?;
            vec![engine.run_cut(corte, periodo, zona)?]
        }
    };

    print_summary(&engine, &reports, periodo, zona)?;

    if let Some(path) = export_path {
        let rows = engine.consolidated(periodo, zona)?;
        if rows.is_empty() {
            bail!("nothing to export: no corte 1 rows for {periodo} {zona}");
        }
        std::fs::write(path, consolidation::to_csv(&rows)?)
            .with_context(|| format!("writing {path}"))?;
        println!();
        println!("exported {} rows to {path}", rows.len());
    }

    Ok(())
}

fn print_summary(
    engine: &SettlementEngine,
    reports: &[CutReport],
    periodo: Periodo,
    zona: Zona,
) -> Result<()> {
    println!("=== RUN SUMMARY ===");
    for r in reports {
        println!(
            "  {} | rows: {} | flagged: {} | skipped: {} | bad records: {} | run {}",
            r.corte,
            r.rows_written,
            r.flagged,
            r.skipped(),
            r.skipped_records,
            r.run_id
        );
    }

    let rows = engine.consolidated(periodo, zona)?;
    println!();
    println!("=== CONSOLIDATED ({periodo} {zona}) ===");
    if rows.is_empty() {
        println!("  (No agencies settled yet)");
    }
    for row in &rows {
        println!(
            "  {} | {} | comision: {} | descuentos: {} | neto: {}{}",
            row.key.ruc,
            row.ultimo_corte,
            format_money(row.comision_total),
            format_money(row.total_descuentos),
            format_money(row.resultado_neto_final),
            if row.needs_review { " | REVIEW" } else { "" }
        );
    }
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn unix_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
