use std::path::PathBuf;

use dbf::{DbfRecord, Error, File};
use env_logger::{Builder, Env};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(
    name = "dbfcat",
    about = "Dump the header, field descriptors, and records of a .dbf file."
)]
struct Opt {
    /// Input .dbf file
    #[structopt(parse(from_os_str))]
    input: PathBuf,
}

fn init_logger() {
    let env = Env::default()
        .filter_or("DBF_LOG_LEVEL", "info")
        .write_style_or("DBF_LOG_STYLE", "auto");

    Builder::from_env(env).format_timestamp(None).init();
}

fn main() -> dbf::Result<()> {
    init_logger();

    let opt = Opt::from_args();

    if opt.input.extension().and_then(|e| e.to_str()) != Some("dbf") {
        return Err(Error::InvalidArgument(format!(
            "expected a .dbf file, got {}",
            opt.input.display()
        )));
    }

    let mut file = File::new(&opt.input);
    if !file.read_head()? {
        return Err(Error::Format(format!("failed to read header of {}", opt.input.display())));
    }

    println!("{:#?}", file.head());
    for field in file.head_fields() {
        println!("{:11} {} {:3} {}", field.name, field.field_type.as_char(), field.total_len, field.precision_len);
    }

    for _ in 0..file.head().record_number {
        let mut record = DbfRecord::for_schema(file.head_fields());
        if !file.read(&mut record)? {
            break;
        }
        println!("{:?}", record.values());
    }

    Ok(())
}
