//! Compiler intrinsics.
//!
//! A handful of dotted call names are not function calls in the target
//! language. They stand for preprocessor directives and for writes into the
//! firmware's motor arrays, and each gets its own lowering.

use crate::ast::Expr;
use crate::error::CoreError;

/// Kind of intrinsic, used to pick the lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicKind {
    /// `#pragma directive(args...)`.
    Pragma,

    /// `motor[port] = power`.
    MotorPower,

    /// One `slaveMotor(sub, primary)` per subordinate motor.
    SlaveMotors,

    /// `bMotorReflected[port] = flag`.
    MotorReversed,
}

/// Metadata about a single intrinsic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrinsicDescriptor {
    /// Dotted name as written in source (e.g. `vex.motor`).
    pub name: &'static str,

    pub kind: IntrinsicKind,

    pub min_args: usize,

    /// `None` for intrinsics taking any number of trailing arguments.
    pub max_args: Option<usize>,
}

pub const INTRINSICS: &[IntrinsicDescriptor] = &[
    IntrinsicDescriptor {
        name: "vex.pragma",
        kind: IntrinsicKind::Pragma,
        min_args: 1,
        max_args: None,
    },
    IntrinsicDescriptor {
        name: "vex.motor",
        kind: IntrinsicKind::MotorPower,
        min_args: 2,
        max_args: Some(2),
    },
    IntrinsicDescriptor {
        name: "vex.slaveMotors",
        kind: IntrinsicKind::SlaveMotors,
        min_args: 1,
        max_args: None,
    },
    IntrinsicDescriptor {
        name: "vex.motorReversed",
        kind: IntrinsicKind::MotorReversed,
        min_args: 2,
        max_args: Some(2),
    },
];

/// Look up an intrinsic by its dotted name.
///
/// The table is tiny, a linear scan is enough.
pub fn find_intrinsic(name: &str) -> Option<&'static IntrinsicDescriptor> {
    INTRINSICS.iter().find(|intrinsic| intrinsic.name == name)
}

impl IntrinsicDescriptor {
    fn expect_arity(&self, given: usize) -> Result<(), CoreError> {
        let too_few = given < self.min_args;
        let too_many = self.max_args.is_some_and(|max| given > max);
        if !too_few && !too_many {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => format!("{max}"),
            Some(max) => format!("{} to {max}", self.min_args),
            None => format!("at least {}", self.min_args),
        };
        Err(CoreError::Render(format!(
            "intrinsic '{}' expects {expected} arguments but received {given}",
            self.name
        )))
    }

    /// Lower a call to this intrinsic. `render` renders one argument.
    pub fn lower<R>(&self, args: &[Expr], render: R) -> Result<String, CoreError>
    where
        R: Fn(&Expr) -> Result<String, CoreError>,
    {
        self.expect_arity(args.len())?;
        match self.kind {
            IntrinsicKind::Pragma => {
                let directive = match &args[0] {
                    Expr::Str(text) | Expr::Name(text) => text.clone(),
                    _ => {
                        return Err(CoreError::Render(
                            "pragma directive must be a string or a bare name".to_string(),
                        ));
                    }
                };
                let mut out = format!("#pragma {directive}");
                if args.len() > 1 {
                    let rest = args[1..]
                        .iter()
                        .map(&render)
                        .collect::<Result<Vec<_>, _>>()?;
                    out.push('(');
                    out.push_str(&rest.join(", "));
                    out.push(')');
                }
                out.push('\n');
                Ok(out)
            }
            IntrinsicKind::MotorPower => Ok(format!(
                "motor[{}] = {}",
                render(&args[0])?,
                render(&args[1])?
            )),
            IntrinsicKind::SlaveMotors => {
                let primary = render(&args[0])?;
                let links = args[1..]
                    .iter()
                    .map(|sub| Ok(format!("slaveMotor({}, {primary})", render(sub)?)))
                    .collect::<Result<Vec<_>, CoreError>>()?;
                Ok(links.join(";\n"))
            }
            IntrinsicKind::MotorReversed => Ok(format!(
                "bMotorReflected[{}] = {}",
                render(&args[0])?,
                render(&args[1])?
            )),
        }
    }
}
