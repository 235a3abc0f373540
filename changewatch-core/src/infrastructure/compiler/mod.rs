pub mod expression;

pub use expression::MiniJinjaEvaluator;
