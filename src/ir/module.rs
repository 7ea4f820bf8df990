//! Minimal view of the host program: functions, their parameters and the
//! calls in their bodies. Operands are value names; a name that is not one
//! of the enclosing function's parameters is a local.

use serde::{Serialize, Deserialize};

/// A compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.function(name).is_some()
    }

    /// Names of functions that contain at least one call to `callee`.
    pub fn callers_of(&self, callee: &str) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|f| f.calls().any(|(_, c, _)| c == callee))
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// A function definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub body: Vec<Instruction>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<Param>) -> Self {
        Self { name: name.into(), params, body: Vec::new() }
    }

    pub fn param_position(&self, value: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == value)
    }

    /// Call instructions as `(index, callee, args)`.
    pub fn calls(&self) -> impl Iterator<Item = (usize, &str, &[String])> {
        self.body.iter().enumerate().filter_map(|(i, inst)| match inst {
            Instruction::Call { callee, args } => Some((i, callee.as_str(), args.as_slice())),
            Instruction::Other { .. } => None,
        })
    }
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub is_pointer: bool,
    #[serde(default)]
    pub is_integer: bool,
}

impl Param {
    pub fn pointer(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_pointer: true, is_integer: false }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_pointer: false, is_integer: true }
    }
}

/// An instruction. Only calls matter to the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Other {
        #[serde(default)]
        text: String,
    },
}

impl Instruction {
    pub fn call(callee: impl Into<String>, args: &[&str]) -> Self {
        Instruction::Call {
            callee: callee.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn other(text: impl Into<String>) -> Self {
        Instruction::Other { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callers_and_calls() {
        let mut main = Function::new("main", vec![Param::pointer("A"), Param::integer("n")]);
        main.body.push(Instruction::call("kernel", &["A", "n"]));
        main.body.push(Instruction::other("store"));
        main.body.push(Instruction::call("printf", &[]));
        let module = Module {
            name: "m".to_string(),
            functions: vec![main, Function::new("kernel", vec![])],
        };

        assert_eq!(module.callers_of("kernel"), vec!["main"]);
        assert!(module.callers_of("main").is_empty());
        let main = module.function("main").unwrap();
        let calls: Vec<_> = main.calls().map(|(i, c, _)| (i, c)).collect();
        assert_eq!(calls, vec![(0, "kernel"), (2, "printf")]);
        assert_eq!(main.param_position("n"), Some(1));
        assert_eq!(main.param_position("tmp"), None);
    }

    #[test]
    fn test_instruction_json_shape() {
        let inst: Instruction =
            serde_json::from_str(r#"{"op": "call", "callee": "k", "args": ["A"]}"#).unwrap();
        assert_eq!(inst, Instruction::call("k", &["A"]));
        let other: Instruction = serde_json::from_str(r#"{"op": "other"}"#).unwrap();
        assert_eq!(other, Instruction::other(""));
    }
}
