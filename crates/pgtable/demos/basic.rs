//! End-to-end demo: configure from the environment, read a table, print it.
//!
//! ```bash
//! DATABASE_HOST=localhost DATABASE_UID=postgres DATABASE_PWD=postgres \
//!     cargo run --example basic -- my_table
//! ```

use pgtable::{Database, DbConfig, TableResult, tab};

#[tokio::main]
async fn main() -> TableResult<()> {
    dotenvy::dotenv().ok();

    let table = std::env::args().nth(1).unwrap_or_else(|| "events".to_string());

    let config = DbConfig::from_env()?;
    let db = Database::connect(&config)?;

    let info = db.table(&table).await?;
    println!("{}.{} columns:", info.schema, info.name);
    for column in &info.columns {
        println!("{}", tab(format!("{} {}", column.name, column.data_type), 4));
    }

    let frame = db
        .read(&table)
        .order_by(&info.columns[0].name, false)
        .limit(10)
        .fetch()
        .await?;

    println!("\nlast {} rows:\n{}", frame.len(), tab(&frame, 2));
    Ok(())
}
