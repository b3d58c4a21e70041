use crate::source::Span;
use crate::types::{Node, PrimitiveFunc};
use crate::{math, primitives};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

// --- Environment Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("Unbound variable: '{0}'")]
    UnboundVariable(String, Span), // Symbol name, span where lookup happened
    #[error("Procedure expects {expected} arguments, got {found}")]
    ArityMismatch {
        expected: usize,
        found: usize,
        span: Span,
    },
}

impl EnvError {
    pub fn span(&self) -> Span {
        match self {
            EnvError::UnboundVariable(_, span) | EnvError::ArityMismatch { span, .. } => *span,
        }
    }
}

// --- Environment Definition ---

/// One frame of the scope chain.
///
/// Frames are always handled through `Rc<RefCell<Environment>>`: a closure
/// keeps the frame it was created in alive after the call that built it has
/// returned, and `set!` needs to mutate frames further up the chain.
#[derive(Debug, Default)]
pub struct Environment {
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Node>, // Maps variable names to Nodes
}

impl Environment {
    /// Creates a new, empty top-level (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// Creates the global environment with the math library and the core
    /// primitives bound.
    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::new(); // Create empty global env
        {
            // Borrow mutably only inside this scope
            let mut env = env_ptr.borrow_mut();

            // --- Math library ---
            for (name, value) in math::CONSTANTS {
                env.set_local(name.to_string(), Node::new_float(*value, Span::default()));
            }
            for (name, func) in math::FUNCTIONS {
                env.add_primitive(name, *func);
            }

            // --- Arithmetic ---
            env.add_primitive("+", primitives::prim_add);
            env.add_primitive("-", primitives::prim_sub);
            env.add_primitive("*", primitives::prim_mul);
            env.add_primitive("/", primitives::prim_div);
            env.add_primitive("=", primitives::prim_equals);
            env.add_primitive("<", primitives::prim_less_than);
            env.add_primitive("<=", primitives::prim_less_than_or_equals);
            env.add_primitive(">", primitives::prim_greater_than);
            env.add_primitive(">=", primitives::prim_greater_than_or_equals);
            env.add_primitive("abs", primitives::prim_abs);
            env.add_primitive("min", primitives::prim_min);
            env.add_primitive("max", primitives::prim_max);
            env.add_primitive("round", primitives::prim_round);

            // --- List Primitives ---
            env.add_primitive("cons", primitives::prim_cons);
            env.add_primitive("car", primitives::prim_car);
            env.add_primitive("cdr", primitives::prim_cdr);
            env.add_primitive("list", primitives::prim_list);
            env.add_primitive("length", primitives::prim_length);
            env.add_primitive("append", primitives::prim_append);

            // --- Type Predicates ---
            env.add_primitive("null?", primitives::prim_is_null);
            env.add_primitive("list?", primitives::prim_is_list);
            env.add_primitive("number?", primitives::prim_is_number);
            env.add_primitive("symbol?", primitives::prim_is_symbol);
            env.add_primitive("procedure?", primitives::prim_is_procedure);
            env.add_primitive("eq?", primitives::prim_is_eq);
            env.add_primitive("equal?", primitives::prim_is_equal);
            env.add_primitive("not", primitives::prim_not);

            // --- Control ---
            env.add_primitive("begin", primitives::prim_begin);
            env.add_primitive("apply", primitives::prim_apply);
            env.add_primitive("map", primitives::prim_map);
        }
        env_ptr
    }

    /// Creates a new, empty environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Creates a call frame binding each parameter to the argument in the same
    /// position. `call_span` locates the call for arity errors.
    pub fn new_frame(
        params: &[String],
        args: Vec<Node>,
        outer_env: Rc<RefCell<Environment>>,
        call_span: Span,
    ) -> Result<Rc<RefCell<Self>>, EnvError> {
        if params.len() != args.len() {
            return Err(EnvError::ArityMismatch {
                expected: params.len(),
                found: args.len(),
                span: call_span,
            });
        }
        Ok(Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: params.iter().cloned().zip(args).collect(),
        })))
    }

    /// Finds the nearest frame, starting at `env` and walking outward, that
    /// binds `name`.
    pub fn lookup_frame(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        lookup_span: Span,
    ) -> Result<Rc<RefCell<Environment>>, EnvError> {
        let frame = env.borrow();
        if frame.bindings.contains_key(name) {
            return Ok(Rc::clone(env));
        }
        match &frame.outer {
            Some(outer_env_ptr) => Environment::lookup_frame(outer_env_ptr, name, lookup_span),
            // Reached the top-level environment without finding it
            None => Err(EnvError::UnboundVariable(name.to_string(), lookup_span)),
        }
    }

    /// Looks up a variable's value anywhere in the chain.
    /// `lookup_span` is the location where the variable was referenced, used for error reporting.
    pub fn lookup(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        lookup_span: Span,
    ) -> Result<Node, EnvError> {
        let frame = Environment::lookup_frame(env, name, lookup_span)?;
        let value = frame.borrow().get(name);
        value.ok_or_else(|| EnvError::UnboundVariable(name.to_string(), lookup_span))
    }

    /// Reads a binding from this frame only.
    pub fn get(&self, name: &str) -> Option<Node> {
        self.bindings.get(name).cloned()
    }

    /// Defines a variable in *this* frame, replacing any previous value here.
    pub fn set_local(&mut self, name: String, value_node: Node) {
        self.bindings.insert(name, value_node);
    }

    /// Overwrites an *existing* variable in the nearest frame that binds it.
    /// Errors, writing nothing, if no frame in the chain does.
    pub fn set_existing(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        value_node: Node,
        set_span: Span,
    ) -> Result<(), EnvError> {
        let frame = Environment::lookup_frame(env, name, set_span)?;
        frame.borrow_mut().set_local(name.to_string(), value_node);
        Ok(())
    }

    /// Helper to add a primitive procedure to the environment.
    fn add_primitive(&mut self, name: &'static str, func: PrimitiveFunc) {
        let node = Node::new_primitive(func, name, Span::default());
        self.set_local(name.to_string(), node);
    }

    /// Gets every identifier visible from this environment
    pub fn get_identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        if let Some(outer_env_ptr) = &self.outer {
            identifiers.extend(outer_env_ptr.borrow().get_identifiers());
        }
        identifiers
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    // Helper to create a dummy node with default span
    fn num_node(n: i64) -> Node {
        Node::new_int(n, Span::default())
    }

    fn sym_node(s: &str) -> Node {
        Node::new_symbol(s, Span::default())
    }

    fn get(env: &Rc<RefCell<Environment>>, name: &str) -> Result<Node, EnvError> {
        Environment::lookup(env, name, Span::default())
    }

    #[test]
    fn test_define_and_get_global() {
        let env = Environment::new();
        env.borrow_mut().set_local("x".to_string(), num_node(10));

        assert_eq!(get(&env, "x").unwrap(), num_node(10));
        assert_eq!(env.borrow().get("x"), Some(num_node(10)));
    }

    #[test]
    fn test_get_unbound_global() {
        let env = Environment::new();
        let result = get(&env, "y");
        assert!(matches!(result, Err(EnvError::UnboundVariable(s, _)) if s == "y"));
    }

    #[test]
    fn test_define_and_get_enclosed() {
        let global_env = Environment::new();
        global_env
            .borrow_mut()
            .set_local("x".to_string(), num_node(10)); // Define x globally

        let local_env = Environment::new_enclosed(global_env.clone());
        local_env
            .borrow_mut()
            .set_local("y".to_string(), num_node(20)); // Define y locally

        assert_eq!(get(&local_env, "y").unwrap(), num_node(20));
        assert_eq!(get(&local_env, "x").unwrap(), num_node(10));
        // The local frame itself does not hold x, and y never reaches the global frame
        assert_eq!(local_env.borrow().get("x"), None);
        assert!(get(&global_env, "y").is_err());
    }

    #[test]
    fn test_get_unbound_enclosed() {
        let global_env = Environment::new();
        let local_env = Environment::new_enclosed(global_env);

        let span = Span::new(11, 12);
        let result = Environment::lookup(&local_env, "z", span);
        assert_eq!(
            result,
            Err(EnvError::UnboundVariable("z".to_string(), span))
        );
        assert_eq!(result.unwrap_err().span(), span);
    }

    #[test]
    fn test_shadowing() {
        let global_env = Environment::new();
        global_env
            .borrow_mut()
            .set_local("x".to_string(), num_node(10));

        let local_env = Environment::new_enclosed(global_env.clone());
        local_env
            .borrow_mut()
            .set_local("x".to_string(), num_node(50)); // Shadow global x

        let inner_local_env = Environment::new_enclosed(local_env.clone());
        inner_local_env
            .borrow_mut()
            .set_local("y".to_string(), sym_node("y-value"));

        assert_eq!(get(&inner_local_env, "x").unwrap(), num_node(50));
        assert_eq!(get(&inner_local_env, "y").unwrap(), sym_node("y-value"));
        assert_eq!(get(&local_env, "x").unwrap(), num_node(50));
        assert_eq!(get(&global_env, "x").unwrap(), num_node(10));
    }

    #[test]
    fn test_lookup_frame_finds_nearest_binding() {
        let global_env = Environment::new();
        global_env
            .borrow_mut()
            .set_local("x".to_string(), num_node(1));
        let middle = Environment::new_enclosed(global_env.clone());
        let inner = Environment::new_enclosed(middle.clone());

        let frame = Environment::lookup_frame(&inner, "x", Span::default()).unwrap();
        assert!(Rc::ptr_eq(&frame, &global_env));

        middle.borrow_mut().set_local("x".to_string(), num_node(2));
        let frame = Environment::lookup_frame(&inner, "x", Span::default()).unwrap();
        assert!(Rc::ptr_eq(&frame, &middle));
    }

    #[test]
    fn test_new_frame_binds_positionally() {
        let global_env = Environment::new();
        let params = vec!["a".to_string(), "b".to_string()];
        let frame = Environment::new_frame(
            &params,
            vec![num_node(1), num_node(2)],
            global_env,
            Span::default(),
        )
        .unwrap();
        assert_eq!(frame.borrow().get("a"), Some(num_node(1)));
        assert_eq!(frame.borrow().get("b"), Some(num_node(2)));
    }

    #[test]
    fn test_new_frame_arity_mismatch() {
        let params = vec!["a".to_string(), "b".to_string()];
        let result =
            Environment::new_frame(&params, vec![num_node(1)], Environment::new(), Span::new(3, 9));
        assert_eq!(
            result.err(),
            Some(EnvError::ArityMismatch {
                expected: 2,
                found: 1,
                span: Span::new(3, 9),
            })
        );
    }

    #[test]
    fn test_set_existing_updates_outer_frame() {
        let global_env = Environment::new();
        global_env
            .borrow_mut()
            .set_local("x".to_string(), num_node(10));
        let local_env = Environment::new_enclosed(global_env.clone());

        Environment::set_existing(&local_env, "x", num_node(11), Span::default()).unwrap();

        assert_eq!(get(&global_env, "x").unwrap(), num_node(11));
        assert_eq!(local_env.borrow().get("x"), None);
    }

    #[test]
    fn test_set_existing_prefers_shadowing_frame() {
        let global_env = Environment::new();
        global_env
            .borrow_mut()
            .set_local("x".to_string(), num_node(10));
        let local_env = Environment::new_enclosed(global_env.clone());
        local_env
            .borrow_mut()
            .set_local("x".to_string(), num_node(20));

        Environment::set_existing(&local_env, "x", num_node(21), Span::default()).unwrap();

        assert_eq!(get(&local_env, "x").unwrap(), num_node(21));
        assert_eq!(get(&global_env, "x").unwrap(), num_node(10));
    }

    #[test]
    fn test_set_existing_unbound_error() {
        let global_env = Environment::new();
        let local_env = Environment::new_enclosed(global_env.clone());
        let result = Environment::set_existing(&local_env, "x", num_node(1), Span::default());
        assert!(matches!(result, Err(EnvError::UnboundVariable(s, _)) if s == "x"));
        // Nothing was written anywhere
        assert!(get(&local_env, "x").is_err());
        assert!(global_env.borrow().get_identifiers().is_empty());
    }

    #[test]
    fn test_get_identifiers_walks_chain() {
        let global_env = Environment::new();
        global_env
            .borrow_mut()
            .set_local("outer".to_string(), num_node(1));
        let local_env = Environment::new_enclosed(global_env);
        local_env
            .borrow_mut()
            .set_local("inner".to_string(), num_node(2));

        let ids = local_env.borrow().get_identifiers();
        assert!(ids.contains("outer"));
        assert!(ids.contains("inner"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_global_populated_bindings() {
        let env = Environment::new_global_populated();
        let ids = env.borrow().get_identifiers();
        for name in [
            "+", "-", "*", "/", "<", ">", "<=", ">=", "=", "cons", "car", "cdr", "list", "length",
            "append", "null?", "list?", "number?", "symbol?", "procedure?", "eq?", "equal?", "not",
            "min", "max", "abs", "round", "begin", "apply", "map", "sqrt", "sin", "pi",
        ] {
            assert!(ids.contains(name), "missing primitive '{}'", name);
        }
    }
}
