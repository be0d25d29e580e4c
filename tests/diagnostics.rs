use ferrous_ioc::prelude::*;
use ferrous_ioc::{PlanNode, PlanVisitor, RegistryModule};
use std::sync::Arc;

trait Widget: Send + Sync {
    fn color(&self) -> &str;
}

struct ColorWidget {
    color: String,
}

impl Widget for ColorWidget {
    fn color(&self) -> &str {
        &self.color
    }
}

trait Service: Send + Sync {}
struct DefaultService;
impl Service for DefaultService {}

struct GuyWithService {
    _service: Arc<dyn Service>,
}

struct Widgets;

impl RegistryModule for Widgets {
    fn configure(&self, registry: &mut Registry) {
        let descriptor = TypeDescriptor::of::<ColorWidget>()
            .constructor(|c| {
                c.primitive::<String>("color")
                    .build(|args| Ok(ColorWidget { color: args.value("color")? }))
            })
            .plugs_into::<dyn Widget>(|w| w)
            .build();

        registry
            .for_type::<dyn Widget>()
            .add(Instance::constructed(descriptor.clone()).named("red").with_value("color", "Red".to_string()))
            .add(Instance::constructed(descriptor).named("blue").with_value("color", "Blue".to_string()))
            .default_named("red")
            .singleton();
    }
}

struct Services;

impl RegistryModule for Services {
    fn configure(&self, registry: &mut Registry) {
        let guy = TypeDescriptor::of::<GuyWithService>()
            .constructor(|c| {
                c.service::<dyn Service>("service")
                    .build(|args| Ok(GuyWithService { _service: args.get("service")? }))
            })
            .build();

        registry.for_type::<dyn Service>().use_object(Arc::new(DefaultService));
        registry
            .for_type::<GuyWithService>()
            .use_instance(Instance::constructed(guy).named("guy"));
    }
}

fn container() -> Container {
    let mut registry = Registry::new();
    registry.include(&Widgets).include(&Services);
    Container::new(registry)
}

#[test]
fn test_describe_renders_the_plan_tree() {
    let text = container().describe::<GuyWithService>(None).unwrap();
    let expected = "\
Build plan for GuyWithService ('guy') [Transient]
└── GuyWithService(service)
    └── Argument 'service'
        └── Default instance of dyn Service
";
    assert_eq!(text, expected);
}

#[test]
fn test_describe_shows_casts_and_explicit_values() {
    let text = container().describe::<dyn Widget>(Some("blue")).unwrap();
    assert!(text.starts_with("Build plan for dyn Widget ('blue') [Singleton]"), "{}", text);
    assert!(text.contains("Cast to dyn Widget"), "{}", text);
    assert!(text.contains("Argument 'color'"), "{}", text);
    assert!(text.contains("Value \"Blue\""), "{}", text);
}

#[test]
fn test_describe_marks_failed_members() {
    let mut registry = Registry::new();
    registry.for_type::<GuyWithService>().use_instance(Instance::constructed(
        TypeDescriptor::of::<GuyWithService>()
            .constructor(|c| {
                c.service::<dyn Service>("service")
                    .build(|args| Ok(GuyWithService { _service: args.get("service")? }))
            })
            .build(),
    ));

    let text = Container::new(registry).describe::<GuyWithService>(None).unwrap();
    assert!(text.contains("FAILED: "), "{}", text);
    assert!(text.contains("dyn Service"), "{}", text);
}

#[derive(Default)]
struct Census {
    depth: usize,
    deepest: usize,
    arguments: Vec<String>,
}

impl PlanVisitor for Census {
    fn enter(&mut self, node: &PlanNode<'_>) {
        self.depth += 1;
        self.deepest = self.deepest.max(self.depth);
        if let PlanNode::Argument { name } = node {
            self.arguments.push(name.to_string());
        }
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}

#[test]
fn test_custom_visitor_walks_every_node() {
    let plan = container().build_plan::<GuyWithService>(None).unwrap();
    let mut census = Census::default();
    plan.accept(&mut census);

    assert_eq!(census.depth, 0);
    assert_eq!(census.deepest, 4);
    assert_eq!(census.arguments, ["service"]);
}

#[test]
fn test_model_lists_families_and_defaults() {
    let model = container().model();

    let widgets = model.family("dyn Widget").expect("widget family");
    assert_eq!(widgets.default_instance.as_deref(), Some("red"));
    assert_eq!(widgets.lifecycle, Some(Lifecycle::Singleton));
    let names: Vec<&str> = widgets.instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["red", "blue"]);

    let json: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();
    assert!(json["families"].as_array().map_or(false, |f| f.len() >= 3));
}

#[test]
fn test_modules_compose_into_one_container() {
    let container = container();
    assert_eq!(container.get_instance::<dyn Widget>().unwrap().color(), "Red");
    assert_eq!(container.get_named_instance::<dyn Widget>("blue").unwrap().color(), "Blue");
    assert!(container.get_instance::<GuyWithService>().is_ok());
    assert!(container.assert_configuration_is_valid().is_ok());
}

#[test]
fn test_resolution_logs_through_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();

    let container = container();
    assert!(container.get_instance::<GuyWithService>().is_ok());
    assert!(format!("{:?}", container).contains("Container"));
}
