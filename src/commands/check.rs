// ABOUTME: Check command - validates configuration and connectivity without copying
// ABOUTME: Reports which configured tables are eligible for replication

use anyhow::{Context, Result};

use super::RunArgs;
use crate::postgres::PgStore;
use crate::tail::resolve_eligible;

/// Connect to both databases and list the tables a sync would process.
pub async fn check(args: RunArgs) -> Result<()> {
    let config = args.resolve()?;
    let owner = config.owner.as_deref();

    let mut source = PgStore::connect(&config.source, &config.schema, owner)
        .await
        .context("Source database is not reachable")?;
    let mut target = match PgStore::connect(&config.target, &config.schema, owner).await {
        Ok(store) => store,
        Err(e) => {
            source.close().await;
            return Err(e.context("Target database is not reachable"));
        }
    };

    let eligible = resolve_eligible(&config.tables, &mut source, &mut target).await;
    source.close().await;
    target.close().await;
    let eligible = eligible?;

    println!("Source: {}", config.source.label());
    println!("Target: {}", config.target.label());
    println!("Schema: {}", config.schema);
    println!();
    for table in &config.tables {
        let mark = if eligible.contains(table) {
            "eligible"
        } else {
            "skipped (not a base table in both databases)"
        };
        println!("  {:<32} {}", table, mark);
    }
    println!();
    println!(
        "{} of {} configured table(s) will be replicated",
        eligible.len(),
        config.tables.len()
    );

    Ok(())
}
