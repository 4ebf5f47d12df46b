// Example: Basic table and storage usage
// Run with: cargo run --example basic_usage

use colstore::{AggregateKind, BuiltinType, DateTimeMode, StorageConfig, Table, Value};

fn main() -> anyhow::Result<()> {
    println!("=== colstore Basic Usage Example ===\n");

    // 1. Create a table with a few typed columns
    println!("1. Creating an 'orders' table...");
    let config = StorageConfig {
        table_name: "orders".to_string(),
        date_time_mode: DateTimeMode::Utc,
        ..StorageConfig::default()
    };
    let mut table = Table::new(&config)?;
    table.add_column("id", BuiltinType::Int32.into())?;
    table.add_column("customer", BuiltinType::String.into())?;
    table.add_column("amount", BuiltinType::Decimal.into())?;
    table.add_column("placed", BuiltinType::DateTime.into())?;
    table.add_column("discount", BuiltinType::SqlMoney.into())?;
    println!("{}\n", table.format());

    // 2. Insert rows; values given as text are converted by each column
    println!("2. Inserting orders...");
    let orders = [
        ("1", "Alice Johnson", "120.50", "2024-03-01T09:30:00Z", "null"),
        ("2", "Bob Smith", "75.00", "2024-03-02T14:00:00+02:00", "5.25"),
        ("3", "Charlie Brown", "310.10", "2024-03-05T18:45:00Z", "null"),
    ];
    for (id, customer, amount, placed, discount) in orders {
        let row = table.new_row();
        table.set("id", row, Value::from(id))?;
        table.set("customer", row, Value::from(customer))?;
        table.set("amount", row, Value::from(amount))?;
        table.set("placed", row, Value::from(placed))?;
        if discount != "null" {
            table.set("discount", row, Value::from(discount))?;
        }
    }
    println!("{}\n", table.format());

    // 3. Aggregate over every row
    println!("3. Aggregates...");
    let rows: Vec<usize> = (0..table.row_count()).collect();
    for kind in [AggregateKind::Sum, AggregateKind::Mean, AggregateKind::Max, AggregateKind::Count] {
        if let Some(value) = table.aggregate("amount", &rows, kind)? {
            println!("  {}(amount) = {}", kind, value);
        }
    }
    match table.aggregate("customer", &rows, AggregateKind::Sum)? {
        Some(value) => println!("  Sum(customer) = {}", value),
        None => println!("  Sum is not supported for strings"),
    }
    println!();

    // 4. XML text of individual cells
    println!("4. XML text...");
    for column in ["amount", "placed", "discount"] {
        let text = table.to_xml(column, 1)?.unwrap_or_else(|| "(null)".to_string());
        println!("  {}[1] = {}", column, text);
    }
    println!();

    // 5. Conversion failures leave the cell untouched
    println!("5. Storing 'lots' in the amount column...");
    if let Err(e) = table.set("amount", 0, Value::from("lots")) {
        println!("  Error: {}", e);
    }
    println!("  amount[0] is still {}\n", table.get("amount", 0)?);

    // 6. Clone a subset of rows through the bulk snapshot path
    println!("6. Cloning rows 2 and 0...");
    let subset = table.clone_rows(&[2, 0])?;
    println!("{}", subset.format());

    Ok(())
}
