use std::env;
use std::fs;
use std::process;

use domain::adapters::memory_store::InMemoryStore;
use domain::dashboard;
use domain::rescue::RescueFilter;
use domain::seed;
use domain::service::RecordGateway;
use domain::{Criteria, Record, ID_FIELD};
use serde_json::Value;

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain filter <water|mountain|disaster|reset> <records.json>\n  domain demo\n\nNotes:\n  - This demo CLI uses an in-memory store; data is not persisted across runs.\n  - <records.json> is a JSON array of shelter outcome records.",
        domain::about()
    );
}

fn load(gateway: &RecordGateway<InMemoryStore>, path: &str) -> Result<usize, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path, e))?;
    seed::import(gateway, &raw).map_err(|e| format!("load failed: {}", e))
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    let gateway = RecordGateway::new(InMemoryStore::new());

    match cmd.as_str() {
        "filter" => {
            let Some(name) = args.next() else {
                return Err("missing <filter>".into());
            };
            let Some(path) = args.next() else {
                return Err("missing <records.json>".into());
            };
            let filter = RescueFilter::parse(&name);
            let loaded = load(&gateway, &path)?;
            let rows = filter
                .query(&gateway)
                .map_err(|e| format!("query failed: {}", e))?;
            println!("{}: {} of {} records", filter.label(), rows.len(), loaded);
            for slice in dashboard::outcome_breakdown(&rows) {
                println!("  {:<20} {}", slice.outcome_type, slice.count);
            }
            Ok(())
        }
        "demo" => {
            let record: Record = [
                ("animal_type", Value::from("Dog")),
                ("breed", Value::from("Newfoundland")),
                ("sex_upon_outcome", Value::from("Intact Female")),
                ("age_upon_outcome_in_weeks", Value::from(30)),
            ]
            .into_iter()
            .collect();
            let created = gateway
                .create(Some(record))
                .map_err(|e| format!("create failed: {}", e))?;
            println!("created: {}", created.inserted_id);

            let lookup = Criteria::all().and(ID_FIELD, created.inserted_id.as_str());
            let changes: Record = [("breed", Value::from("Labrador Retriever Mix"))]
                .into_iter()
                .collect();
            let updated = gateway
                .update(Some(&lookup), Some(&changes))
                .map_err(|e| format!("update failed: {}", e))?;
            println!(
                "updated: matched={} modified={}",
                updated.matched_count, updated.modified_count
            );

            let found = gateway
                .find(Some(&Criteria::all().and("breed", "Labrador Retriever Mix")))
                .and_then(|cursor| cursor.collect_records())
                .map_err(|e| format!("find failed: {}", e))?;
            println!("found: {}", found.len());

            let deleted = gateway
                .delete(Some(&lookup))
                .map_err(|e| format!("delete failed: {}", e))?;
            println!("deleted: {}", deleted.deleted_count);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
