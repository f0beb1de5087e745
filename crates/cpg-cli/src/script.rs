//! JSON graph scripts.
//!
//! A script is an ordered list of steps playing the roles of a frontend
//! (node construction) and of the resolution passes (`resolve`, `invokes`,
//! `substitute`). Every node-creating step names the new node with a
//! `label`; later steps refer to nodes by label.
//!
//! ```json
//! {
//!   "steps": [
//!     { "step": "literal", "label": "one", "type": "int", "code": "1" },
//!     { "step": "variable", "label": "x", "name": "x", "init": "one" },
//!     { "step": "reference", "label": "rx", "name": "x" },
//!     { "step": "resolve", "reference": "rx", "declaration": "x" }
//!   ]
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cpg_core::id::NodeId;
use cpg_core::node::RecordKind;
use cpg_core::types::Type;
use cpg_typeprop::{
    LanguageProfile, PropagationDiagnostic, PropagationMode, TypePropError, TypedGraph,
};

use crate::type_syntax::{parse_type, TypeSyntaxError};

/// Errors running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("step {step}: unknown label '{label}'")]
    UnknownLabel { step: usize, label: String },

    #[error("step {step}: label '{label}' is already defined")]
    DuplicateLabel { step: usize, label: String },

    #[error("step {step}: {source}")]
    Type {
        step: usize,
        #[source]
        source: TypeSyntaxError,
    },

    #[error("step {step}: {source}")]
    Graph {
        step: usize,
        #[source]
        source: TypePropError,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    /// Overrides the default language profile.
    #[serde(default)]
    pub profile: Option<LanguageProfile>,
    #[serde(default)]
    pub mode: Option<PropagationMode>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
}

/// One script step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    // -- Declarations --
    TranslationUnit {
        label: String,
        name: String,
    },
    Record {
        label: String,
        name: String,
        kind: RecordKind,
        #[serde(default)]
        supers: Vec<String>,
    },
    Function {
        label: String,
        name: String,
        #[serde(default)]
        params: Vec<ParamDecl>,
        #[serde(default)]
        returns: Vec<String>,
    },
    Parameter {
        label: String,
        function: String,
        name: String,
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        variadic: bool,
    },
    Variable {
        label: String,
        name: String,
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        init: Option<String>,
    },
    Field {
        label: String,
        record: String,
        name: String,
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        init: Option<String>,
    },

    // -- Statements --
    Block {
        label: String,
        #[serde(default)]
        statements: Vec<String>,
    },
    DeclarationStatement {
        label: String,
        declarations: Vec<String>,
    },
    Return {
        label: String,
        #[serde(default)]
        value: Option<String>,
    },

    // -- Expressions --
    Literal {
        label: String,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        code: String,
    },
    Reference {
        label: String,
        name: String,
    },
    MemberAccess {
        label: String,
        base: String,
        member: String,
    },
    Call {
        label: String,
        name: String,
        #[serde(default)]
        args: Vec<String>,
    },
    TemplateCall {
        label: String,
        name: String,
        parameters: Vec<String>,
        #[serde(default)]
        args: Vec<String>,
    },
    Construct {
        label: String,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        args: Vec<String>,
    },
    New {
        label: String,
        init: String,
    },
    Binary {
        label: String,
        op: String,
        lhs: String,
        rhs: String,
    },
    Unary {
        label: String,
        op: String,
        operand: String,
        #[serde(default)]
        postfix: bool,
    },
    Assign {
        label: String,
        #[serde(default = "default_assign_op")]
        op: String,
        lhs: Vec<String>,
        rhs: Vec<String>,
        #[serde(default)]
        used_as_expression: bool,
    },
    Cast {
        label: String,
        #[serde(rename = "type")]
        ty: String,
        operand: String,
    },
    InitializerList {
        label: String,
        elements: Vec<String>,
    },
    Conditional {
        label: String,
        condition: String,
        then: String,
        #[serde(rename = "else")]
        otherwise: String,
    },
    Subscript {
        label: String,
        base: String,
        index: String,
    },
    ExpressionList {
        label: String,
        elements: Vec<String>,
    },

    // -- Resolution passes --
    Resolve {
        reference: String,
        declaration: String,
    },
    Invokes {
        call: String,
        functions: Vec<String>,
    },
    Substitute {
        node: String,
        #[serde(rename = "type")]
        ty: String,
    },
    SetType {
        node: String,
        #[serde(rename = "type")]
        ty: String,
    },
    Refresh {
        node: String,
    },
    Flush,
}

fn default_assign_op() -> String {
    "=".to_string()
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Type information of one labelled node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub kind: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub sub_types: Vec<String>,
}

/// The outcome of a script run, printed as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub mode: PropagationMode,
    pub nodes: IndexMap<String, NodeReport>,
    pub diagnostics: Vec<String>,
    /// Observer cycles, as lists of labels.
    pub observer_cycles: Vec<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

struct Runner {
    tg: TypedGraph,
    labels: IndexMap<String, NodeId>,
    step: usize,
}

/// Runs `script`. `profile` and `mode` apply when the script does not set
/// its own. A deferred run is flushed before the report is taken.
pub fn run(
    script: &Script,
    profile: LanguageProfile,
    mode: PropagationMode,
) -> Result<Report, ScriptError> {
    let profile = script.profile.clone().unwrap_or(profile);
    let mode = script.mode.unwrap_or(mode);
    let mut runner = Runner {
        tg: TypedGraph::new(profile, mode),
        labels: IndexMap::new(),
        step: 0,
    };
    for (i, step) in script.steps.iter().enumerate() {
        runner.step = i;
        runner.apply(step)?;
    }
    runner.tg.flush();
    Ok(runner.report())
}

impl Runner {
    fn node(&self, label: &str) -> Result<NodeId, ScriptError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| ScriptError::UnknownLabel {
                step: self.step,
                label: label.to_string(),
            })
    }

    fn nodes(&self, labels: &[String]) -> Result<Vec<NodeId>, ScriptError> {
        labels.iter().map(|l| self.node(l)).collect()
    }

    fn optional(&self, label: &Option<String>) -> Result<Option<NodeId>, ScriptError> {
        label.as_deref().map(|l| self.node(l)).transpose()
    }

    fn ty(&self, text: &str) -> Result<Type, ScriptError> {
        parse_type(text).map_err(|source| ScriptError::Type {
            step: self.step,
            source,
        })
    }

    fn optional_ty(&self, text: &Option<String>) -> Result<Option<Type>, ScriptError> {
        text.as_deref().map(|t| self.ty(t)).transpose()
    }

    fn graph<T>(&self, result: Result<T, TypePropError>) -> Result<T, ScriptError> {
        result.map_err(|source| ScriptError::Graph {
            step: self.step,
            source,
        })
    }

    fn define(&mut self, label: &str, id: NodeId) -> Result<(), ScriptError> {
        if self.labels.contains_key(label) {
            return Err(ScriptError::DuplicateLabel {
                step: self.step,
                label: label.to_string(),
            });
        }
        debug!(label, %id, "node defined");
        self.labels.insert(label.to_string(), id);
        Ok(())
    }

    fn apply(&mut self, step: &Step) -> Result<(), ScriptError> {
        let (label, id) = match step {
            Step::TranslationUnit { label, name } => (label, self.tg.add_translation_unit(name)),
            Step::Record {
                label,
                name,
                kind,
                supers,
            } => {
                let supers: Vec<&str> = supers.iter().map(String::as_str).collect();
                let result = self.tg.add_record(name, *kind, &supers);
                (label, self.graph(result)?)
            }
            Step::Function {
                label,
                name,
                params,
                returns,
            } => {
                let mut typed = Vec::with_capacity(params.len());
                for p in params {
                    typed.push((p.name.as_str(), self.optional_ty(&p.ty)?));
                }
                let returns = returns
                    .iter()
                    .map(|r| self.ty(r))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = self.tg.add_function(name, &typed, returns);
                (label, self.graph(result)?)
            }
            Step::Parameter {
                label,
                function,
                name,
                ty,
                variadic,
            } => {
                let function = self.node(function)?;
                let ty = self.optional_ty(ty)?;
                let result = self.tg.add_parameter(function, name, ty, *variadic);
                (label, self.graph(result)?)
            }
            Step::Variable {
                label,
                name,
                ty,
                init,
            } => {
                let ty = self.optional_ty(ty)?;
                let init = self.optional(init)?;
                let result = self.tg.add_variable(name, ty, init);
                (label, self.graph(result)?)
            }
            Step::Field {
                label,
                record,
                name,
                ty,
                init,
            } => {
                let record = self.node(record)?;
                let ty = self.optional_ty(ty)?;
                let init = self.optional(init)?;
                let result = self.tg.add_field(record, name, ty, init);
                (label, self.graph(result)?)
            }
            Step::Block { label, statements } => {
                let statements = self.nodes(statements)?;
                let result = self.tg.add_block(&statements);
                (label, self.graph(result)?)
            }
            Step::DeclarationStatement {
                label,
                declarations,
            } => {
                let declarations = self.nodes(declarations)?;
                let result = self.tg.add_declaration_statement(&declarations);
                (label, self.graph(result)?)
            }
            Step::Return { label, value } => {
                let value = self.optional(value)?;
                let result = self.tg.add_return(value);
                (label, self.graph(result)?)
            }
            Step::Literal { label, ty, code } => {
                let ty = self.ty(ty)?;
                (label, self.tg.add_literal(ty, code))
            }
            Step::Reference { label, name } => (label, self.tg.add_reference(name)),
            Step::MemberAccess {
                label,
                base,
                member,
            } => {
                let base = self.node(base)?;
                let result = self.tg.add_member_access(base, member);
                (label, self.graph(result)?)
            }
            Step::Call { label, name, args } => {
                let args = self.nodes(args)?;
                let result = self.tg.add_call(name, &args);
                (label, self.graph(result)?)
            }
            Step::TemplateCall {
                label,
                name,
                parameters,
                args,
            } => {
                let parameters = parameters
                    .iter()
                    .map(|p| self.ty(p))
                    .collect::<Result<Vec<_>, _>>()?;
                let args = self.nodes(args)?;
                let result = self.tg.add_template_call(name, parameters, &args);
                (label, self.graph(result)?)
            }
            Step::Construct { label, ty, args } => {
                let ty = self.ty(ty)?;
                let args = self.nodes(args)?;
                let result = self.tg.add_construct(ty, &args);
                (label, self.graph(result)?)
            }
            Step::New { label, init } => {
                let init = self.node(init)?;
                let result = self.tg.add_new(init);
                (label, self.graph(result)?)
            }
            Step::Binary {
                label,
                op,
                lhs,
                rhs,
            } => {
                let (lhs, rhs) = (self.node(lhs)?, self.node(rhs)?);
                let result = self.tg.add_binary(op, lhs, rhs);
                (label, self.graph(result)?)
            }
            Step::Unary {
                label,
                op,
                operand,
                postfix,
            } => {
                let operand = self.node(operand)?;
                let result = self.tg.add_unary(op, operand, *postfix);
                (label, self.graph(result)?)
            }
            Step::Assign {
                label,
                op,
                lhs,
                rhs,
                used_as_expression,
            } => {
                let (lhs, rhs) = (self.nodes(lhs)?, self.nodes(rhs)?);
                let result = self.tg.add_assign(op, &lhs, &rhs, *used_as_expression);
                (label, self.graph(result)?)
            }
            Step::Cast { label, ty, operand } => {
                let ty = self.ty(ty)?;
                let operand = self.node(operand)?;
                let result = self.tg.add_cast(ty, operand);
                (label, self.graph(result)?)
            }
            Step::InitializerList { label, elements } => {
                let elements = self.nodes(elements)?;
                let result = self.tg.add_initializer_list(&elements);
                (label, self.graph(result)?)
            }
            Step::Conditional {
                label,
                condition,
                then,
                otherwise,
            } => {
                let condition = self.node(condition)?;
                let then = self.node(then)?;
                let otherwise = self.node(otherwise)?;
                let result = self.tg.add_conditional(condition, then, otherwise);
                (label, self.graph(result)?)
            }
            Step::Subscript { label, base, index } => {
                let (base, index) = (self.node(base)?, self.node(index)?);
                let result = self.tg.add_subscript(base, index);
                (label, self.graph(result)?)
            }
            Step::ExpressionList { label, elements } => {
                let elements = self.nodes(elements)?;
                let result = self.tg.add_expression_list(&elements);
                (label, self.graph(result)?)
            }

            Step::Resolve {
                reference,
                declaration,
            } => {
                let (reference, declaration) = (self.node(reference)?, self.node(declaration)?);
                let result = self.tg.resolve_reference(reference, declaration);
                return self.graph(result);
            }
            Step::Invokes { call, functions } => {
                let call = self.node(call)?;
                let functions = self.nodes(functions)?;
                let result = self.tg.set_invokes(call, &functions);
                return self.graph(result);
            }
            Step::Substitute { node, ty } => {
                let (node, ty) = (self.node(node)?, self.ty(ty)?);
                let result = self.tg.substitute_type(node, ty);
                return self.graph(result);
            }
            Step::SetType { node, ty } => {
                let (node, ty) = (self.node(node)?, self.ty(ty)?);
                let result = self.tg.set_type(node, ty);
                return self.graph(result);
            }
            Step::Refresh { node } => {
                let node = self.node(node)?;
                let result = self.tg.refresh(node);
                return self.graph(result);
            }
            Step::Flush => {
                self.tg.flush();
                return Ok(());
            }
        };
        self.define(label, id)
    }

    fn report(&self) -> Report {
        let graph = self.tg.graph();
        let label_of = |id: NodeId| {
            self.labels
                .iter()
                .find(|(_, n)| **n == id)
                .map(|(l, _)| l.clone())
                .unwrap_or_else(|| id.to_string())
        };

        let nodes = self
            .labels
            .iter()
            .filter_map(|(label, &id)| {
                let node = graph.node(id)?;
                let state = node.types.as_ref()?;
                Some((
                    label.clone(),
                    NodeReport {
                        id,
                        kind: node.kind.label().to_string(),
                        ty: state.current.to_string(),
                        sub_types: state
                            .possible_sub_types
                            .iter()
                            .map(Type::to_string)
                            .collect(),
                    },
                ))
            })
            .collect();

        Report {
            mode: self.tg.mode(),
            nodes,
            diagnostics: self
                .tg
                .diagnostics()
                .iter()
                .map(PropagationDiagnostic::to_string)
                .collect(),
            observer_cycles: graph
                .observer_cycles()
                .into_iter()
                .map(|cycle| cycle.into_iter().map(label_of).collect())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_json(json: &str) -> Result<Report, ScriptError> {
        let script = Script::from_json(json)?;
        run(&script, LanguageProfile::default(), PropagationMode::Live)
    }

    #[test]
    fn tuple_destructuring_script() {
        let report = run_json(
            r#"{
              "steps": [
                { "step": "function", "label": "f", "name": "f", "returns": ["int", "bool"] },
                { "step": "call", "label": "call", "name": "f" },
                { "step": "variable", "label": "a", "name": "a" },
                { "step": "variable", "label": "b", "name": "b" },
                { "step": "reference", "label": "ra", "name": "a" },
                { "step": "reference", "label": "rb", "name": "b" },
                { "step": "assign", "label": "assign", "lhs": ["ra", "rb"], "rhs": ["call"] },
                { "step": "resolve", "reference": "ra", "declaration": "a" },
                { "step": "resolve", "reference": "rb", "declaration": "b" },
                { "step": "invokes", "call": "call", "functions": ["f"] }
              ]
            }"#,
        )
        .unwrap();

        assert_eq!(report.nodes["call"].ty, "(int, bool)");
        assert_eq!(report.nodes["a"].ty, "int");
        assert_eq!(report.nodes["b"].ty, "bool");
        assert_eq!(report.nodes["a"].kind, "Variable");
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.observer_cycles.len(), 2);
        assert!(report.observer_cycles.contains(&vec!["a".to_string(), "ra".to_string()]));
    }

    #[test]
    fn deferred_script_is_flushed() {
        let report = run_json(
            r#"{
              "mode": "deferred",
              "steps": [
                { "step": "literal", "label": "one", "type": "int", "code": "1" },
                { "step": "new", "label": "new", "init": "one" },
                { "step": "variable", "label": "p", "name": "p", "init": "new" }
              ]
            }"#,
        )
        .unwrap();
        assert_eq!(report.mode, PropagationMode::Deferred);
        assert_eq!(report.nodes["p"].ty, "int*");
    }

    #[test]
    fn structural_nodes_are_not_reported() {
        let report = run_json(
            r#"{
              "steps": [
                { "step": "record", "label": "A", "name": "A", "kind": "Struct" },
                { "step": "field", "label": "x", "record": "A", "name": "x", "type": "double" }
              ]
            }"#,
        )
        .unwrap();
        assert!(!report.nodes.contains_key("A"));
        assert_eq!(report.nodes["x"].ty, "double");
    }

    #[test]
    fn errors_name_the_step() {
        let err = run_json(r#"{ "steps": [ { "step": "new", "label": "n", "init": "missing" } ] }"#)
            .unwrap_err();
        assert!(matches!(err, ScriptError::UnknownLabel { step: 0, .. }));

        let err = run_json(
            r#"{ "steps": [
                { "step": "reference", "label": "r", "name": "r" },
                { "step": "reference", "label": "r", "name": "r" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::DuplicateLabel { step: 1, .. }));

        let err = run_json(
            r#"{ "steps": [ { "step": "literal", "label": "l", "type": "int]", "code": "" } ] }"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "step 0: invalid type 'int]' at offset 3: unexpected trailing input"
        );

        let err = run_json(
            r#"{ "steps": [
                { "step": "literal", "label": "l", "type": "int", "code": "1" },
                { "step": "parameter", "label": "p", "function": "l", "name": "p" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::Graph { step: 1, .. }));

        assert!(matches!(run_json("{"), Err(ScriptError::Parse(_))));
    }
}
