//! The value-expression model behind configured options.
//!
//! Parsed options always carry constant bytes; configured options may
//! instead carry an expression built by the composition operators. The
//! assembler reduces either shape to a concrete byte string through
//! [`evaluate_option_cache`], in an evaluation scope naming the packet
//! being answered and the inbound/configured option states.

use crate::{
    packet::Packet,
    store::{CacheValue, DataString, OptionCache, OptionState},
};

#[derive(Debug, Clone)]
pub enum Expr {
    /// Constant bytes.
    Const(DataString),
    /// Concatenation of two sub-expressions.
    Concat(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn concat(left: Expr, right: Expr) -> Expr {
        Expr::Concat(Box::new(left), Box::new(right))
    }

    fn reduce(&self) -> DataString {
        match self {
            Expr::Const(data) => data.clone(),
            Expr::Concat(left, right) => left.reduce().concat(&right.reduce()),
        }
    }
}

/// The scope an option value is evaluated in. The constant and
/// concatenation operators ignore it; it is threaded through so every
/// evaluation site names the packet and option states it acts for.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvalContext<'a> {
    pub packet: Option<&'a Packet>,
    pub in_options: Option<&'a OptionState>,
    pub cfg_options: Option<&'a OptionState>,
}

/// Reduce an option cache to its byte-string value. An empty result is
/// reported as `None`; emission treats an empty value and an absent cache
/// identically.
pub fn evaluate_option_cache(oc: &OptionCache, _ctx: &EvalContext<'_>) -> Option<DataString> {
    let data = match &oc.value {
        CacheValue::Data(data) => data.clone(),
        CacheValue::Expression(expression) => expression.reduce(),
    };

    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}
