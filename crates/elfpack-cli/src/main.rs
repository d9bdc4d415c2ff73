use clap::Parser;
use elfpack_core::elf::{self, writer};
use elfpack_core::resolve::{self, SectionNames, STUB_SECTION_NAME};
use elfpack_core::stub;
use elfpack_core::transform;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "elfpack", version, about = "Encrypt .text of an ELF64 executable and inject a self-decrypting stub")]
struct Cli {
    /// Input ELF64 executable (must already contain the stub section)
    input: PathBuf,
    /// Name of the pre-reserved stub section
    #[arg(long, default_value = STUB_SECTION_NAME)]
    stub_section: String,
    /// Print a disassembly of the injected stub
    #[arg(long)]
    disasm: bool,
}

fn main() {
    let cli = Cli::parse();
    let input = cli.input;

    // ─── Load ────────────────────────────────────────────────
    let mut image = elf::load(&input).unwrap_or_else(|e| {
        eprintln!("Error reading '{}': {}", input.display(), e);
        std::process::exit(1);
    });

    // ─── Resolve ─────────────────────────────────────────────
    let names = SectionNames { stub: cli.stub_section, ..SectionNames::default() };
    let targets = resolve::resolve(&image, &names).unwrap_or_else(|e| {
        eprintln!("{}: {}", input.display(), e);
        std::process::exit(1);
    });

    let stub_section = image.sections[targets.stub_section];
    println!("[*] Section header table: 0x{:X}", image.header.shoff);
    println!("[*] Entry point: 0x{:X}", image.header.entry);
    println!("[*] Sections: {}", image.header.shnum);
    println!("[*] Stub section {}: {} bytes", names.stub, stub_section.size);

    // ─── Pack ────────────────────────────────────────────────
    let report = transform::pack(&mut image, &targets).unwrap_or_else(|e| {
        eprintln!("{}: {}", input.display(), e);
        std::process::exit(1);
    });

    println!("[+] {} encrypted: {} bytes at 0x{:X} (key 0x{:02X})",
        names.code, report.code_len, report.code_addr, report.key);
    println!("[+] Stub injected: {} bytes at 0x{:X}", report.stub_len, report.new_entry);
    println!("    code rel32 {:+}, entry rel32 {:+}",
        report.code_displacement, report.entry_displacement);
    println!("[+] Segment flags: +X on #{}, +W on #{}", targets.stub_segment, targets.code_segment);
    println!("[+] Entry redirect: 0x{:X} → 0x{:X}", report.old_entry, report.new_entry);

    if cli.disasm {
        let code = &image.section_data(&stub_section)[..report.stub_len];
        for line in stub::disassemble(code, report.new_entry) {
            println!("    {line}");
        }
    }

    // ─── Write output ────────────────────────────────────────
    // A failed write is reported but does not change the exit status.
    match writer::dump(&image, &input) {
        Ok(path) => println!("[+] Output: {}", path.display()),
        Err(e) => eprintln!(
            "[!] Error writing '{}': {}",
            writer::output_file_name(&input).to_string_lossy(),
            e
        ),
    }
}
