//! Embed the code tables from `data/*_CODES.json` as `u64` constants.

use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::{env, fs};

#[derive(Deserialize)]
struct CodeTable {
    name: String,
    marker_size: usize,
    max_correction_bits: u8,
    codes: Vec<u64>,
}

fn main() {
    let data_dir = Path::new(&env::var("CARGO_MANIFEST_DIR").expect("manifest dir")).join("data");
    println!("cargo:rerun-if-changed={}", data_dir.display());

    let mut paths: Vec<PathBuf> = fs::read_dir(&data_dir)
        .expect("read data dir")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut out = String::new();
    let mut tables = Vec::with_capacity(paths.len());
    for path in &paths {
        println!("cargo:rerun-if-changed={}", path.display());
        let raw = fs::read_to_string(path).expect("read code table");
        let table: CodeTable = serde_json::from_str(&raw).expect("parse code table");
        let bits = table.marker_size * table.marker_size;
        assert!(bits <= 64, "{}: {} bits do not fit a u64", table.name, bits);

        let ident = table.name.to_uppercase();
        writeln!(out, "/// `{}` code table ({} codes).", table.name, table.codes.len()).unwrap();
        writeln!(
            out,
            "pub static {ident}_CODES: [u64; {}] = [",
            table.codes.len()
        )
        .unwrap();
        for chunk in table.codes.chunks(4) {
            let line: Vec<String> = chunk.iter().map(|c| format!("0x{c:012x}")).collect();
            writeln!(out, "    {},", line.join(", ")).unwrap();
        }
        writeln!(out, "];").unwrap();
        writeln!(
            out,
            "pub const {ident}_MARKER_SIZE: usize = {};",
            table.marker_size
        )
        .unwrap();
        writeln!(
            out,
            "pub const {ident}_MAX_CORRECTION_BITS: u8 = {};\n",
            table.max_correction_bits
        )
        .unwrap();
        tables.push((table.name, ident));
    }

    writeln!(out, "/// Every embedded table, sorted by file name.").unwrap();
    writeln!(out, "pub static TABLES: [CodeTable; {}] = [", tables.len()).unwrap();
    for (name, ident) in &tables {
        writeln!(
            out,
            "    CodeTable {{ name: {name:?}, marker_size: {ident}_MARKER_SIZE, \
             max_correction_bits: {ident}_MAX_CORRECTION_BITS, codes: &{ident}_CODES }},"
        )
        .unwrap();
    }
    writeln!(out, "];").unwrap();

    let dest = Path::new(&env::var("OUT_DIR").expect("out dir")).join("builtins.rs");
    fs::write(dest, out).expect("write builtins.rs");
}
