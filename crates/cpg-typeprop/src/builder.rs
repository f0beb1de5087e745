//! Frontend-facing node construction.
//!
//! Every `add_*` method creates one node, attaches the given children with
//! the right [`AstRole`] and subscribes the new node to the children its type
//! depends on. The subscription fires an initial notification, so a node
//! built over already typed children is typed when the call returns (in live
//! mode).

use tracing::trace;

use cpg_core::edge::{AccessMode, AstRole};
use cpg_core::id::NodeId;
use cpg_core::node::{Node, NodeKind, RecordKind, TemplateArgs, TypeState};
use cpg_core::types::Type;

use crate::engine::Proposal;
use crate::strategy::Pending;
use crate::{TypePropError, TypedGraph};

impl TypedGraph {
    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    /// Appends `child` to `parent`'s `role` list.
    pub fn attach(
        &mut self,
        parent: NodeId,
        child: NodeId,
        role: AstRole,
    ) -> Result<(), TypePropError> {
        self.graph.add_ast_child(parent, child, role)?;
        Ok(())
    }

    /// Subscribes `observer` to `src` and lets it react to `src`'s current
    /// state once. Existing subscriptions and self-subscriptions are
    /// ignored.
    pub fn subscribe(&mut self, src: NodeId, observer: NodeId) -> Result<(), TypePropError> {
        if self.graph.add_observer(src, observer)? {
            trace!(%src, %observer, "subscribed");
            self.schedule(Pending::Notify { src, observer });
        }
        Ok(())
    }

    fn create(&mut self, kind: NodeKind, name: &str) -> NodeId {
        self.graph.add_node(Node::new(kind, name))
    }

    /// Sets a type that never changes through propagation.
    fn fix(&mut self, node: NodeId, ty: Type) {
        if let Some(state) = self.graph.types_mut(node) {
            *state = TypeState::known(ty);
        }
    }

    fn attach_all(
        &mut self,
        parent: NodeId,
        children: &[NodeId],
        role: AstRole,
    ) -> Result<(), TypePropError> {
        for &child in children {
            self.attach(parent, child, role)?;
        }
        Ok(())
    }

    fn expect_kind(
        &self,
        id: NodeId,
        expected: &'static str,
        matches: fn(&NodeKind) -> bool,
    ) -> Result<(), TypePropError> {
        let node = self.graph.get(id)?;
        if matches(&node.kind) {
            Ok(())
        } else {
            Err(TypePropError::WrongKind {
                id,
                expected,
                actual: node.kind.label(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    pub fn add_translation_unit(&mut self, name: &str) -> NodeId {
        self.create(NodeKind::TranslationUnit, name)
    }

    /// Adds a record and registers it with its super-records in the
    /// hierarchy used by the join.
    pub fn add_record(
        &mut self,
        name: &str,
        kind: RecordKind,
        super_types: &[&str],
    ) -> Result<NodeId, TypePropError> {
        let supers: Vec<String> = super_types.iter().map(|s| s.to_string()).collect();
        self.graph.records.register(name, &supers)?;
        Ok(self.create(
            NodeKind::Record {
                kind,
                super_types: supers,
            },
            name,
        ))
    }

    /// Adds a function with its parameters. The function's type is the
    /// function pointer built from the parameter and return types.
    pub fn add_function(
        &mut self,
        name: &str,
        params: &[(&str, Option<Type>)],
        return_types: Vec<Type>,
    ) -> Result<NodeId, TypePropError> {
        let function = self.create(NodeKind::Function { return_types }, name);
        self.retype_function(function);
        for (param, declared) in params {
            self.add_parameter(function, param, declared.clone(), false)?;
        }
        Ok(function)
    }

    /// Appends a parameter to `function` and updates the function's type.
    pub fn add_parameter(
        &mut self,
        function: NodeId,
        name: &str,
        declared: Option<Type>,
        variadic: bool,
    ) -> Result<NodeId, TypePropError> {
        self.expect_kind(function, "Function", |k| matches!(k, NodeKind::Function { .. }))?;
        let param = self.create(
            NodeKind::Parameter {
                declared: declared.clone(),
                variadic,
            },
            name,
        );
        if let Some(ty) = declared {
            self.fix(param, ty);
        }
        self.attach(function, param, AstRole::Parameter)?;
        self.retype_function(function);
        Ok(param)
    }

    /// Recomputes a function's pointer type and re-broadcasts it when it
    /// changed.
    fn retype_function(&mut self, function: NodeId) {
        let Some(NodeKind::Function { return_types }) = self.graph.node(function).map(|n| &n.kind)
        else {
            return;
        };
        let returns = return_types.clone();
        let params = self
            .graph
            .ast_children(function, AstRole::Parameter)
            .into_iter()
            .map(|p| {
                self.graph
                    .node(p)
                    .and_then(|n| n.kind.declared_type().cloned())
                    .unwrap_or_default()
            })
            .collect();
        let ty = Type::function(params, returns);
        if self.graph.types(function).map(|s| &s.current) == Some(&ty) {
            return;
        }
        self.fix(function, ty);
        self.schedule(Pending::Refresh { node: function });
    }

    pub fn add_variable(
        &mut self,
        name: &str,
        declared: Option<Type>,
        initializer: Option<NodeId>,
    ) -> Result<NodeId, TypePropError> {
        self.value_declaration(NodeKind::Variable { declared }, name, initializer)
    }

    /// Adds a field declaration to `record`.
    pub fn add_field(
        &mut self,
        record: NodeId,
        name: &str,
        declared: Option<Type>,
        initializer: Option<NodeId>,
    ) -> Result<NodeId, TypePropError> {
        self.expect_kind(record, "Record", |k| matches!(k, NodeKind::Record { .. }))?;
        let field = self.value_declaration(NodeKind::Field { declared }, name, initializer)?;
        self.attach(record, field, AstRole::Declaration)?;
        Ok(field)
    }

    fn value_declaration(
        &mut self,
        kind: NodeKind,
        name: &str,
        initializer: Option<NodeId>,
    ) -> Result<NodeId, TypePropError> {
        let declared = kind.declared_type().cloned();
        let decl = self.create(kind, name);
        if let Some(ty) = declared {
            self.schedule(Pending::Propose {
                node: decl,
                proposal: Proposal::of(ty),
            });
        }
        if let Some(init) = initializer {
            self.attach(decl, init, AstRole::Initializer)?;
            self.subscribe(init, decl)?;
        }
        Ok(decl)
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    pub fn add_block(&mut self, statements: &[NodeId]) -> Result<NodeId, TypePropError> {
        let block = self.create(NodeKind::Block, "");
        self.attach_all(block, statements, AstRole::Child)?;
        Ok(block)
    }

    pub fn add_declaration_statement(
        &mut self,
        declarations: &[NodeId],
    ) -> Result<NodeId, TypePropError> {
        let stmt = self.create(NodeKind::DeclarationStatement, "");
        self.attach_all(stmt, declarations, AstRole::Declaration)?;
        Ok(stmt)
    }

    pub fn add_return(&mut self, value: Option<NodeId>) -> Result<NodeId, TypePropError> {
        let ret = self.create(NodeKind::Return, "");
        if let Some(value) = value {
            self.attach(ret, value, AstRole::Value)?;
        }
        Ok(ret)
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub fn add_literal(&mut self, ty: Type, code: &str) -> NodeId {
        let literal = self
            .graph
            .add_node(Node::new(NodeKind::Literal { ty: ty.clone() }, "").with_code(code));
        self.fix(literal, ty);
        literal
    }

    /// An unresolved reference; see
    /// [`resolve_reference`](Self::resolve_reference).
    pub fn add_reference(&mut self, name: &str) -> NodeId {
        self.create(NodeKind::Reference, name)
    }

    /// `base.member`. The type comes from the field it is resolved to.
    pub fn add_member_access(
        &mut self,
        base: NodeId,
        member: &str,
    ) -> Result<NodeId, TypePropError> {
        let access = self.create(
            NodeKind::MemberAccess {
                member: member.to_string(),
            },
            member,
        );
        self.attach(access, base, AstRole::Base)?;
        Ok(access)
    }

    /// A call whose targets are set later with
    /// [`set_invokes`](Self::set_invokes).
    pub fn add_call(&mut self, name: &str, args: &[NodeId]) -> Result<NodeId, TypePropError> {
        let call = self.create(NodeKind::Call { template: None }, name);
        self.attach_all(call, args, AstRole::Argument)?;
        Ok(call)
    }

    /// A call instantiating a template. It ignores proposals until
    /// [`substitute_type`](Self::substitute_type) resolves it.
    pub fn add_template_call(
        &mut self,
        name: &str,
        parameters: Vec<Type>,
        args: &[NodeId],
    ) -> Result<NodeId, TypePropError> {
        let call = self.create(
            NodeKind::Call {
                template: Some(TemplateArgs::pending(parameters)),
            },
            name,
        );
        self.attach_all(call, args, AstRole::Argument)?;
        Ok(call)
    }

    /// A constructor expression of `record`.
    pub fn add_construct(
        &mut self,
        record: Type,
        args: &[NodeId],
    ) -> Result<NodeId, TypePropError> {
        let name = record.to_string();
        let construct = self.create(
            NodeKind::Construct {
                record: record.clone(),
            },
            &name,
        );
        self.fix(construct, record);
        self.attach_all(construct, args, AstRole::Argument)?;
        Ok(construct)
    }

    /// `new <initializer>`: a pointer to the initializer's type.
    pub fn add_new(&mut self, initializer: NodeId) -> Result<NodeId, TypePropError> {
        let new = self.create(NodeKind::New, "");
        self.attach(new, initializer, AstRole::Initializer)?;
        self.subscribe(initializer, new)?;
        Ok(new)
    }

    pub fn add_binary(
        &mut self,
        op: &str,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, TypePropError> {
        let binary = self.create(NodeKind::BinaryOperator { op: op.to_string() }, op);
        self.attach(binary, lhs, AstRole::Lhs)?;
        self.attach(binary, rhs, AstRole::Rhs)?;
        if self.profile.yields_boolean(op) {
            let boolean = self.profile.boolean_type.clone();
            self.schedule(Pending::Propose {
                node: binary,
                proposal: Proposal::of(boolean),
            });
        }
        self.subscribe(lhs, binary)?;
        self.subscribe(rhs, binary)?;
        Ok(binary)
    }

    /// Increment and decrement both read and write their operand.
    pub fn add_unary(
        &mut self,
        op: &str,
        operand: NodeId,
        postfix: bool,
    ) -> Result<NodeId, TypePropError> {
        let unary = self.create(
            NodeKind::UnaryOperator {
                op: op.to_string(),
                postfix,
            },
            op,
        );
        self.attach(unary, operand, AstRole::Operand)?;
        if op == "++" || op == "--" {
            self.graph.set_access_mode(operand, AccessMode::ReadWrite)?;
        }
        self.subscribe(operand, unary)?;
        Ok(unary)
    }

    /// `lhs... op rhs...`. Targets of a compound assignment are read and
    /// written, targets of any other assignment are written.
    pub fn add_assign(
        &mut self,
        op: &str,
        lhs: &[NodeId],
        rhs: &[NodeId],
        used_as_expression: bool,
    ) -> Result<NodeId, TypePropError> {
        let assign = self.create(
            NodeKind::Assign {
                op: op.to_string(),
                used_as_expression,
            },
            op,
        );
        let access = if self.profile.is_compound_assignment(op) {
            AccessMode::ReadWrite
        } else {
            AccessMode::Write
        };
        for &target in lhs {
            self.attach(assign, target, AstRole::Lhs)?;
            self.graph.set_access_mode(target, access)?;
            self.link_write_back(target)?;
        }
        self.attach_all(assign, rhs, AstRole::Rhs)?;
        for &value in rhs {
            self.subscribe(value, assign)?;
        }
        Ok(assign)
    }

    /// `(target) operand`.
    pub fn add_cast(&mut self, target: Type, operand: NodeId) -> Result<NodeId, TypePropError> {
        let cast = self.create(
            NodeKind::Cast {
                target: target.clone(),
            },
            "",
        );
        self.fix(cast, target);
        self.attach(cast, operand, AstRole::Operand)?;
        self.subscribe(operand, cast)?;
        Ok(cast)
    }

    pub fn add_initializer_list(&mut self, elements: &[NodeId]) -> Result<NodeId, TypePropError> {
        let list = self.create(NodeKind::InitializerList, "");
        self.attach_all(list, elements, AstRole::Element)?;
        for &element in elements {
            self.subscribe(element, list)?;
        }
        Ok(list)
    }

    /// `condition ? then : otherwise`.
    pub fn add_conditional(
        &mut self,
        condition: NodeId,
        then: NodeId,
        otherwise: NodeId,
    ) -> Result<NodeId, TypePropError> {
        let cond = self.create(NodeKind::Conditional, "");
        self.attach(cond, condition, AstRole::Condition)?;
        self.attach(cond, then, AstRole::Then)?;
        self.attach(cond, otherwise, AstRole::Else)?;
        self.subscribe(then, cond)?;
        self.subscribe(otherwise, cond)?;
        Ok(cond)
    }

    /// `base[index]`.
    pub fn add_subscript(&mut self, base: NodeId, index: NodeId) -> Result<NodeId, TypePropError> {
        let subscript = self.create(NodeKind::Subscript, "");
        self.attach(subscript, base, AstRole::Base)?;
        self.attach(subscript, index, AstRole::Subscript)?;
        self.subscribe(base, subscript)?;
        Ok(subscript)
    }

    /// A comma expression; its value is the last element.
    pub fn add_expression_list(&mut self, elements: &[NodeId]) -> Result<NodeId, TypePropError> {
        let list = self.create(NodeKind::ExpressionList, "");
        self.attach_all(list, elements, AstRole::Element)?;
        if let Some(&last) = elements.last() {
            self.subscribe(last, list)?;
        }
        Ok(list)
    }
}
