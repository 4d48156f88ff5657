pub mod analysis;
pub mod config;
pub mod delivery;
pub mod differentiate;
pub mod equation_engine;
pub mod events;
pub mod normalize;
pub mod plot;
pub mod scan;
/// The `kurve_core` crate is the numerical engine behind the Kurve function plotter.
/// It turns a user-typed expression in `x` into a curve analysis: y-intercept, zeros,
/// local extrema and inflection points over a fixed domain.
///
/// Key components:
/// - **Normalize**: cleaning and validation of raw input text.
/// - **Equation Engine**: parser, bytecode compiler and stack VM for `f(x)`.
/// - **Scan**: grid sweeps with Newton and bisection refinement.
/// - **Analysis**: the `Analyzer` orchestrating single and overlay analyses.
/// - **Events / Delivery**: structured notifications and a bounded retry outbox.
pub mod traits;

pub use analysis::{AnalysisError, AnalysisRecord, Analyzer, ExpressionInput};
pub use config::ScanConfig;
pub use normalize::{normalize, NormalizedExpression, Rejection};
