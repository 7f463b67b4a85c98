use clap::Parser;
use il2cpp_rs::{domain, Il2Cpp};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Dump the class declarations of a loaded IL2CPP module"
)]
struct Args {
    /// Path to the IL2CPP runtime module (e.g. GameAssembly.so)
    module: PathBuf,
    /// Only dump classes from the assembly with this name
    #[arg(short, long)]
    assembly: Option<String>,
    /// Only dump classes whose full name contains this needle
    #[arg(short, long)]
    filter: Option<String>,
}

fn main() -> il2cpp_rs::Result<()> {
    let args = Args::parse();

    Il2Cpp::attach(&args.module)?;

    for assembly in domain().assemblies() {
        let image = assembly.image();
        if let Some(wanted) = &args.assembly {
            if &image.name() != wanted {
                continue;
            }
        }

        for class in image.classes() {
            if let Some(needle) = &args.filter {
                if !class.full_name().contains(needle.as_str()) {
                    continue;
                }
            }
            println!("{}\n", class);
        }
    }

    Ok(())
}
