use classpatch::class::ClassFile;
use classpatch::pool::PoolScan;
use classpatch::Error;

use clap::{Arg, ArgAction, Command};
use std::fs;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("Class file inspector")
        .version("0.1.0")
        .about("Inspect and rewrite JVM class files")
        .arg(
            Arg::new("pool")
                .long("pool")
                .action(ArgAction::SetTrue)
                .help("Dump the constant pool"),
        )
        .arg(
            Arg::new("code")
                .long("code")
                .action(ArgAction::SetTrue)
                .help("Dump the bytecode of every method"),
        )
        .arg(
            Arg::new("emit")
                .long("emit")
                .value_name("FILE")
                .help("Re-emit the parsed class to this path"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input class file to use")
                .required(true)
                .index(1),
        )
        .get_matches();

    let input = matches.get_one::<String>("INPUT").unwrap();
    log::info!("Reading '{}'", input);
    let bytes = fs::read(input)?;

    if matches.get_flag("pool") {
        dump_pool(&bytes)?;
    }

    let class = ClassFile::parse(&bytes)?;
    println!("class {}", class.class_name()?);

    if matches.get_flag("code") {
        dump_code(&class)?;
    }

    if let Some(output) = matches.get_one::<String>("emit") {
        log::info!("Writing '{}'", output);
        fs::write(output, class.to_bytes()?)?;
    }

    Ok(())
}

/// Print the constant pool without parsing the rest of the image
fn dump_pool(bytes: &[u8]) -> Result<(), Error> {
    let scan = PoolScan::new(bytes)?;
    println!("constant pool: {} slots", scan.size());
    for index in 1..scan.size() {
        let tag = match scan.tag(index) {
            Ok(tag) => tag,
            Err(_) => continue, // unusable slot after a long or double
        };
        match tag {
            1 => println!("  #{}: Utf8 {:?}", index, scan.utf8(index)?),
            _ => println!("  #{}: tag {}", index, tag),
        }
    }
    Ok(())
}

fn dump_code(class: &ClassFile) -> Result<(), Error> {
    let pool = class.pool();
    for method in &class.methods {
        let pool = pool.borrow();
        let name = pool.utf8(method.name_index)?;
        let descriptor = pool.utf8(method.descriptor_index)?;
        println!("method {}{}", name, descriptor);
        drop(pool);

        let code = match &method.code {
            Some(code) => code,
            None => continue,
        };
        println!(
            "  stack={} locals={} bytes={}",
            code.max_stack,
            code.max_locals,
            code.byte_length()
        );
        for id in code.iter() {
            let at = code.byte_index(id)?;
            println!("  {:>5}: {}", at, code.insn(id)?.mnemonic());
        }
        for handler in &code.handlers {
            println!(
                "  try {}..{} handler {} catch #{}",
                handler.try_start.byte_index(code)?,
                handler.end_pc(code)?,
                handler.handler.byte_index(code)?,
                handler.catch_index
            );
        }
    }
    Ok(())
}
