use clap::Args;
use rust_decimal::Decimal;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::workflow::document_request::{check_selection, price_request, DocType, PricedItem};

#[derive(Debug, Args)]
pub struct QuoteArgs {
    #[arg(long = "academic", help = "Academic credential item, e.g. DIPLOMA (repeatable)")]
    pub academic: Vec<String>,
    #[arg(
        long = "certification",
        help = "Certification item, e.g. \"CERTIFICATE OF ENROLLMENT\" (repeatable)"
    )]
    pub certification: Vec<String>,
}

fn priced(args: &QuoteArgs) -> anyhow::Result<(DocType, Vec<PricedItem>, Decimal)> {
    check_selection(&args.academic, &args.certification)?;
    price_request(&args.academic, &args.certification)
        .ok_or_else(|| anyhow::anyhow!("select at least one academic credential or certification"))
}

pub fn handle(args: QuoteArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let (doc_type, items, total) = priced(&args)?;

    match output_format {
        OutputFormat::Json => {
            let body = json!({
                "success": true,
                "doc_type": doc_type,
                "items": items,
                "document_price": total
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            for line in &items {
                println!("{:<40} {:>10}", line.item, line.price);
            }
            println!("{:<40} {:>10}", format!("TOTAL ({})", doc_type.as_str()), total);
        }
    }
    Ok(())
}
