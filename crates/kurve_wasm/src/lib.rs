//! WebAssembly bindings for the Kurve analysis engine.

mod analyzer;

pub use analyzer::WasmAnalyzer;
