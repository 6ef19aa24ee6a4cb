// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for protoforge.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use clap::Parser;
use serde_json::json;

use protoforge::assembler::cli::{validate_cli, Cli, CliConfig, OutputFormat};
use protoforge::assembler::{assemble, ROOT_PROTOTYPE_NAME};
use protoforge::core::error::{AsmError, AsmErrorKind, AsmRunError, Diagnostic, Severity};
use protoforge::vm::bytecode::{Bytecode, Constant};
use protoforge::vm::module::encode_module;

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn format_diagnostic(err: &AsmRunError, use_color: bool, format: OutputFormat) -> String {
    let diag = err.diagnostic();
    if format == OutputFormat::Json {
        json!({
            "code": diag.code(),
            "severity": severity_to_str(diag.severity()),
            "message": diag.message(),
            "file": diag.file(),
            "line": diag.line(),
            "col": diag.column(),
        })
        .to_string()
    } else {
        err.render(use_color)
    }
}

fn module_summary(input_name: &str, bytecode: &Bytecode, module_len: usize) -> serde_json::Value {
    let constants: Vec<serde_json::Value> = bytecode
        .constants
        .iter()
        .map(|constant| match constant {
            Constant::Integer(value) => json!({ "type": "integer", "value": value }),
            Constant::Number(value) => json!({ "type": "number", "value": value }),
            Constant::String(value) => json!({ "type": "string", "value": value }),
        })
        .collect();
    json!({
        "schema": "protoforge-module-v1",
        "input": input_name,
        "root": ROOT_PROTOTYPE_NAME,
        "prototypes": bytecode.root.count(),
        "root_instructions": bytecode.root.instructions.len(),
        "constants": constants,
        "module_bytes": module_len,
    })
}

fn read_source(config: &CliConfig) -> io::Result<(String, String)> {
    match &config.input {
        Some(path) => Ok((path.display().to_string(), fs::read_to_string(path)?)),
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(("<stdin>".to_string(), source))
        }
    }
}

fn fail(error: AsmError, input_name: Option<&str>, format: OutputFormat) -> ! {
    let diag = Diagnostic::new(0, Severity::Error, error)
        .with_file(input_name.map(str::to_string));
    let err = AsmRunError::new(diag, Vec::new());
    eprintln!("{}", format_diagnostic(&err, false, format));
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    let config = match validate_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let (input_name, source) = match read_source(&config) {
        Ok(read) => read,
        Err(err) => fail(
            AsmError::new(AsmErrorKind::Io, format!("Cannot read input: {err}")),
            config.input.as_ref().map(|p| p.to_str().unwrap_or("<input>")),
            config.format,
        ),
    };

    let use_color = std::env::var("NO_COLOR").is_err() && config.format == OutputFormat::Text;
    let bytecode = match assemble(&input_name, &source) {
        Ok(bytecode) => bytecode,
        Err(err) => {
            eprintln!("{}", format_diagnostic(&err, use_color, config.format));
            std::process::exit(1);
        }
    };

    let module = match encode_module(&bytecode) {
        Ok(module) => module,
        Err(err) => fail(
            AsmError::new(AsmErrorKind::Codec, err.to_string()),
            Some(&input_name),
            config.format,
        ),
    };

    if config.dump {
        println!("{}", module_summary(&input_name, &bytecode, module.len()));
        return;
    }

    // validate_cli guarantees an output path whenever --dump is not set.
    let output: &Path = match &config.output {
        Some(path) => path,
        None => fail(
            AsmError::new(AsmErrorKind::Internal, "No output path after validation"),
            Some(&input_name),
            config.format,
        ),
    };
    if let Err(err) = fs::write(output, &module) {
        fail(
            AsmError::new(
                AsmErrorKind::Io,
                format!("Cannot write '{}': {err}", output.display()),
            ),
            Some(&input_name),
            config.format,
        );
    }

    if !config.quiet {
        match config.format {
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "input": input_name,
                    "output": output.display().to_string(),
                    "module_bytes": module.len(),
                })
            ),
            OutputFormat::Text => eprintln!(
                "{input_name}: wrote {} ({} bytes)",
                output.display(),
                module.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_diagnostic_has_expected_keys() {
        let err = assemble("<test>", "frob $r0").unwrap_err();
        let line = format_diagnostic(&err, false, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["message"], "Unknown instruction 'frob'");
        assert_eq!(value["file"], "<test>");
        assert_eq!(value["line"], 1);
        assert_eq!(value["col"], 1);
        assert_eq!(value["code"], "asm201");
    }

    #[test]
    fn module_summary_counts_prototypes() {
        let source = ".start_prototype f\nret\n.end_prototype\nldr $r0, =f\nret";
        let bytecode = assemble("<test>", source).expect("assemble");
        let module = encode_module(&bytecode).expect("encode");
        let summary = module_summary("<test>", &bytecode, module.len());
        assert_eq!(summary["prototypes"], 2);
        assert_eq!(summary["root_instructions"], 2);
        assert_eq!(summary["module_bytes"], module.len());
    }
}
