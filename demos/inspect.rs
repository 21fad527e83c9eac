use std::collections::BTreeMap;
use tabular_datasets::{movielens100k, Value};

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Str(_) => "String",
        Value::Int(_) => "i64",
        Value::Float(_) => "f64",
        Value::Bool(_) => "bool",
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let limit: usize = match std::env::args().nth(1) {
        Some(limit) => limit.parse()?,
        None => 5,
    };

    let dataset = movielens100k();
    println!("{} ({})", dataset.name(), dataset.task());
    println!("Declared: {} samples, {} features", dataset.n_samples(), dataset.n_features());
    println!("Cached at {}", dataset.path()?.display());

    let mut columns = BTreeMap::new();
    let mut count = 0usize;
    for record in dataset.iter()? {
        let record = record?;
        if count < limit {
            println!("{:?} -> {:?}", record.features, record.target);
        }
        if count == 0 {
            for (name, value) in &record.features {
                columns.insert(name.clone(), kind(value));
            }
        }
        count += 1;
    }

    println!();
    println!("pub struct Item {{");
    for (name, dtype) in &columns {
        println!("    {name}: {dtype},");
    }
    println!("}}");
    println!("Count: {count}");
    Ok(())
}
