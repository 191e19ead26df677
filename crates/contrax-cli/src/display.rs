//! Plain-text rendering of contracts, clauses and dashboard figures.
//!
//! A contract prints as a vertical card grouped by section; empty sections
//! are skipped.

use chrono::{DateTime, Utc};
use contrax_core::{Clause, Contract, ContractType, DashboardStats, Page, RiskScale, User};

const MAX_EXPLANATION_CHARS: usize = 240;

type Row = (&'static str, Option<String>);

/// Risk as `42% (medium)`, or a note when the raw value is outside the
/// configured scale.
pub fn risk_label(raw: Option<f64>, scale: RiskScale) -> Option<String> {
    match scale.normalize_opt(raw) {
        Ok(Some(score)) => Some(format!("{score} ({})", score.level())),
        Ok(None) => None,
        Err(e) => Some(format!("unavailable ({e})")),
    }
}

fn date(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Print a contract as a card.
pub fn print_contract_card(contract: &Contract, scale: RiskScale) {
    println!("=== {} ===", contract.title);
    println!("{}", contract.id);
    println!();

    let kind = contract
        .type_name()
        .map(str::to_string)
        .unwrap_or_else(|| contract.contract_type.id().to_string());
    print_section(
        "Identity",
        &[
            ("type", Some(kind)),
            ("status", Some(contract.status.to_string())),
            ("uploaded_by", contract.uploaded_by_username.clone()),
        ],
    );
    print_section(
        "Analysis",
        &[
            ("risk", risk_label(contract.risk_score, scale)),
            ("risk_level", non_empty(&contract.risk_level)),
            ("total_clauses", Some(contract.total_clauses.to_string())),
            ("abusive_clauses", Some(contract.abusive_clauses_count.to_string())),
            ("processing_time", contract.processing_time.map(|t| format!("{t:.1}s"))),
        ],
    );
    print_section(
        "Dates",
        &[
            ("created_at", date(contract.created_at)),
            ("updated_at", date(contract.updated_at)),
            ("analyzed_at", date(contract.analyzed_at)),
        ],
    );
    print_block("Executive Summary", non_empty(&contract.executive_summary));
    print_block("Recommendations", non_empty(&contract.recommendations));
}

fn print_section(header: &str, rows: &[Row]) {
    if rows.iter().all(|(_, v)| v.is_none()) {
        return;
    }
    println!("{header}");
    for (name, value) in rows {
        if let Some(value) = value {
            println!("  {name:<26} {value}");
        }
    }
    println!();
}

fn print_block(header: &str, text: Option<String>) {
    let Some(text) = text else { return };
    println!("{header}");
    for line in text.lines() {
        println!("  {line}");
    }
    println!();
}

/// One line per contract.
pub fn print_contract_list(page: &Page<Contract>, scale: RiskScale) {
    if page.results.is_empty() {
        println!("No contracts.");
        return;
    }
    println!("{:<38} {:<10} {:<16} {}", "ID", "STATUS", "RISK", "TITLE");
    for c in &page.results {
        let risk = risk_label(c.risk_score, scale).unwrap_or_else(|| "-".to_string());
        println!("{:<38} {:<10} {:<16} {}", c.id, c.status, risk, c.title);
    }
    match page.next_page() {
        Some(next) => println!(
            "\n{} of {} shown, next page: {next}",
            page.results.len(),
            page.count
        ),
        None => println!("\n{} total", page.count),
    }
}

/// Clauses, flagged ones marked with `!`.
pub fn print_clauses(clauses: &[Clause], scale: RiskScale) {
    if clauses.is_empty() {
        println!("No clauses.");
        return;
    }
    let flagged = clauses.iter().filter(|c| c.is_flagged()).count();
    println!("{} clauses, {flagged} flagged", clauses.len());
    println!();
    for clause in clauses {
        let mark = if clause.is_flagged() { "!" } else { " " };
        let kind = clause.clause_type.as_deref().unwrap_or("clause");
        print!("{mark} #{:<4} {kind}", clause.clause_number);
        if let Some(risk) = risk_label(clause.risk_score, scale) {
            print!("  risk {risk}");
        }
        println!();
        println!("    {}", clause.text.trim());
        if let Some(ml) = &clause.ml_analysis {
            println!("    ml: abusive={} p={:.2}", ml.is_abusive, ml.abuse_probability);
        }
        if let Some(gpt) = &clause.gpt_analysis {
            if !gpt.explanation.is_empty() {
                println!("    why: {}", truncate(&gpt.explanation, MAX_EXPLANATION_CHARS));
            }
            if let Some(fix) = gpt.suggested_fix.as_deref().filter(|f| !f.is_empty()) {
                println!("    fix: {}", truncate(fix, MAX_EXPLANATION_CHARS));
            }
        }
        if !clause.entities.is_empty() {
            let ents: Vec<String> = clause
                .entities
                .iter()
                .map(|e| format!("{} [{}]", e.text, e.label))
                .collect();
            println!("    entities: {}", ents.join(", "));
        }
        println!();
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

pub fn print_stats(stats: &DashboardStats, scale: RiskScale) {
    print_section(
        "Contracts",
        &[
            ("total", Some(stats.total_contracts.to_string())),
            ("pending", Some(stats.pending_analysis.to_string())),
            ("analyzing", Some(stats.analyzing.to_string())),
            ("completed", Some(stats.completed.to_string())),
        ],
    );
    print_section(
        "Risk",
        &[
            ("high", Some(stats.high_risk.to_string())),
            ("medium", Some(stats.medium_risk.to_string())),
            ("low", Some(stats.low_risk.to_string())),
        ],
    );
    if !stats.recent_contracts.is_empty() {
        println!("Recent");
        for c in &stats.recent_contracts {
            let risk = risk_label(c.risk_score, scale).unwrap_or_else(|| "-".to_string());
            println!("  {:<10} {:<16} {}", c.status, risk, c.title);
        }
    }
}

pub fn print_types(types: &[ContractType]) {
    for t in types {
        println!("{:>4}  {:<24} {}", t.id, t.name, t.description);
    }
}

pub fn print_user(user: &User) {
    print_section(
        "User",
        &[
            ("username", Some(user.username.clone())),
            ("name", Some(user.display_name())),
            ("email", Some(user.email.clone()).filter(|e| !e.is_empty())),
            ("staff", user.is_staff.then(|| "yes".to_string())),
        ],
    );
}
