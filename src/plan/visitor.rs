//! Read-only traversal of build plans.

use super::{BuildPlan, DependencySource};
use crate::interception::InterceptorRole;
use crate::key::TypeKey;
use crate::lifecycle::Lifecycle;

/// One node reported to a [`PlanVisitor`].
#[derive(Debug, Clone, Copy)]
pub enum PlanNode<'a> {
    /// Root of a plan or of a nested plan.
    Plan {
        plugin_type: &'a TypeKey,
        instance: &'a str,
        lifecycle: Lifecycle,
    },
    /// A ready value, with its recorded label if any.
    Value { ty: &'a TypeKey, label: Option<&'a str> },
    /// A constructor call.
    Constructor { signature: &'a str },
    /// A constructor argument; its source is the only child.
    Argument { name: &'a str },
    /// A setter; its source is the only child.
    Setter { name: &'a str },
    /// Every registered instance of the element type.
    AllInstances { element: &'a TypeKey },
    /// An explicit list; children are the nested plans.
    InstanceList { element: &'a TypeKey, count: usize },
    /// The default instance of a plugin type, resolved at build time.
    DefaultInstance { plugin_type: &'a TypeKey },
    /// A factory function.
    Lambda { description: &'a str },
    /// A serialized copy.
    Deserialize { ty: &'a TypeKey },
    /// An upcast; the cast source is the only child.
    Cast { target: &'a TypeKey },
    /// An interception wrapper; the intercepted source is the first child.
    Interception { plugin_type: &'a TypeKey },
    /// One activator or decorator.
    Interceptor { role: InterceptorRole, description: &'a str },
    /// A member that could not be resolved.
    Failed { reason: &'a str },
}

impl PlanNode<'_> {
    /// Text used by [`BuildPlan::describe`].
    pub fn label(&self) -> String {
        match self {
            PlanNode::Plan {
                plugin_type,
                instance,
                lifecycle,
            } => format!("Build plan for {} ('{}') [{}]", plugin_type, instance, lifecycle),
            PlanNode::Value { ty, label } => match label {
                Some(label) => format!("Value {}", label),
                None => format!("Object of {}", ty),
            },
            PlanNode::Constructor { signature } => signature.to_string(),
            PlanNode::Argument { name } => format!("Argument '{}'", name),
            PlanNode::Setter { name } => format!("Setter '{}'", name),
            PlanNode::AllInstances { element } => format!("All registered {}", element),
            PlanNode::InstanceList { element, count } => format!("List of {} {}", count, element),
            PlanNode::DefaultInstance { plugin_type } => format!("Default instance of {}", plugin_type),
            PlanNode::Lambda { description } => description.to_string(),
            PlanNode::Deserialize { ty } => format!("Deserialize {}", ty),
            PlanNode::Cast { target } => format!("Cast to {}", target),
            PlanNode::Interception { plugin_type } => format!("Interception of {}", plugin_type),
            PlanNode::Interceptor { role, description } => match role {
                InterceptorRole::Activator => format!("Activator: {}", description),
                InterceptorRole::Decorator => format!("Decorator: {}", description),
            },
            PlanNode::Failed { reason } => format!("FAILED: {}", reason),
        }
    }
}

/// Receives plan nodes depth first.
///
/// Every `enter` is matched by one `leave` after the node's children.
pub trait PlanVisitor {
    fn enter(&mut self, node: &PlanNode<'_>);

    fn leave(&mut self) {}
}

pub(crate) fn walk_plan(plan: &BuildPlan, visitor: &mut dyn PlanVisitor) {
    visitor.enter(&PlanNode::Plan {
        plugin_type: plan.plugin_type(),
        instance: plan.instance().name(),
        lifecycle: plan.lifecycle(),
    });
    walk_source(&plan.source, visitor);
    visitor.leave();
}

fn leaf(visitor: &mut dyn PlanVisitor, node: PlanNode<'_>) {
    visitor.enter(&node);
    visitor.leave();
}

fn walk_source(source: &DependencySource, visitor: &mut dyn PlanVisitor) {
    match source {
        DependencySource::Constant(value) => leaf(
            visitor,
            PlanNode::Value {
                ty: value.type_key(),
                label: value.label(),
            },
        ),
        DependencySource::Constructor(step) | DependencySource::Setters { step, .. } => {
            let signature = step.constructor.signature(step.descriptor.type_key());
            visitor.enter(&PlanNode::Constructor { signature: &signature });
            for argument in &step.arguments {
                visitor.enter(&PlanNode::Argument { name: argument.name });
                walk_source(&argument.source, visitor);
                visitor.leave();
            }
            if let DependencySource::Setters { setters, .. } = source {
                for setter in setters {
                    visitor.enter(&PlanNode::Setter {
                        name: setter.setter.name(),
                    });
                    walk_source(&setter.source, visitor);
                    visitor.leave();
                }
            }
            visitor.leave();
        }
        DependencySource::EnumerableAll { element, .. } => leaf(visitor, PlanNode::AllInstances { element }),
        DependencySource::ExplicitEnumerable { element, items, .. } => {
            visitor.enter(&PlanNode::InstanceList {
                element,
                count: items.len(),
            });
            for item in items {
                walk_plan(item, visitor);
            }
            visitor.leave();
        }
        DependencySource::Default { plugin } => leaf(visitor, PlanNode::DefaultInstance { plugin_type: plugin }),
        DependencySource::Reference(plan) => walk_plan(plan, visitor),
        DependencySource::Lambda(spec) => {
            let description = spec.description();
            leaf(visitor, PlanNode::Lambda { description: &description });
        }
        DependencySource::Deserialize(spec) => leaf(visitor, PlanNode::Deserialize { ty: &spec.returned }),
        DependencySource::Cast { inner, target, .. } => {
            visitor.enter(&PlanNode::Cast { target });
            walk_source(inner, visitor);
            visitor.leave();
        }
        DependencySource::Intercepted(plan) => {
            visitor.enter(&PlanNode::Interception {
                plugin_type: &plan.plugin,
            });
            walk_source(&plan.inner, visitor);
            let interceptors = plan
                .groups
                .iter()
                .flat_map(|group| group.activators.iter())
                .chain(plan.decorators.iter());
            for interceptor in interceptors {
                leaf(
                    visitor,
                    PlanNode::Interceptor {
                        role: interceptor.role(),
                        description: interceptor.description(),
                    },
                );
            }
            visitor.leave();
        }
        DependencySource::Failed { reason, .. } => leaf(visitor, PlanNode::Failed { reason }),
    }
}

struct Line {
    label: String,
    children: Vec<Line>,
}

/// Collects visited nodes into a tree and renders it with box-drawing glyphs.
#[derive(Default)]
pub(crate) struct TreeRenderer {
    open: Vec<Line>,
    roots: Vec<Line>,
}

impl PlanVisitor for TreeRenderer {
    fn enter(&mut self, node: &PlanNode<'_>) {
        self.open.push(Line {
            label: node.label(),
            children: Vec::new(),
        });
    }

    fn leave(&mut self) {
        if let Some(done) = self.open.pop() {
            match self.open.last_mut() {
                Some(parent) => parent.children.push(done),
                None => self.roots.push(done),
            }
        }
    }
}

impl TreeRenderer {
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            out.push_str(&root.label);
            out.push('\n');
            render_children(&root.children, "", &mut out);
        }
        out
    }
}

fn render_children(children: &[Line], prefix: &str, out: &mut String) {
    for (index, child) in children.iter().enumerate() {
        let last = index + 1 == children.len();
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&child.label);
        out.push('\n');
        let nested = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_children(&child.children, &nested, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        depth: usize,
        max_depth: usize,
        nodes: usize,
    }

    impl PlanVisitor for Counter {
        fn enter(&mut self, _node: &PlanNode<'_>) {
            self.nodes += 1;
            self.depth += 1;
            self.max_depth = self.max_depth.max(self.depth);
        }

        fn leave(&mut self) {
            self.depth -= 1;
        }
    }

    fn tree(renderer: &mut TreeRenderer) {
        let ty = TypeKey::of::<u8>();
        renderer.enter(&PlanNode::Constructor { signature: "new Pair(left, right)" });
        renderer.enter(&PlanNode::Argument { name: "left" });
        renderer.enter(&PlanNode::Value { ty: &ty, label: Some("1") });
        renderer.leave();
        renderer.leave();
        renderer.enter(&PlanNode::Argument { name: "right" });
        renderer.enter(&PlanNode::DefaultInstance { plugin_type: &ty });
        renderer.leave();
        renderer.leave();
        renderer.leave();
    }

    #[test]
    fn renders_box_drawing_tree() {
        let mut renderer = TreeRenderer::default();
        tree(&mut renderer);
        assert_eq!(
            renderer.render(),
            "new Pair(left, right)\n\
             ├── Argument 'left'\n\
             │   └── Value 1\n\
             └── Argument 'right'\n\
             \x20   └── Default instance of u8\n"
        );
    }

    #[test]
    fn visitors_see_balanced_enter_and_leave() {
        let ty = TypeKey::of::<u8>();
        let mut counter = Counter::default();
        counter.enter(&PlanNode::Cast { target: &ty });
        counter.enter(&PlanNode::Failed { reason: "nope" });
        counter.leave();
        counter.leave();
        assert_eq!(counter.nodes, 2);
        assert_eq!(counter.max_depth, 2);
        assert_eq!(counter.depth, 0);
    }
}
