use ferrous_ioc::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

struct Labelled(String);

struct Decorated {
    layers: Vec<String>,
}

proptest! {
    #[test]
    fn prop_all_instances_follow_registration_order(labels in prop::collection::vec("[a-z]{1,8}", 1..12)) {
        let mut registry = Registry::new();
        {
            let mut family = registry.for_type::<Labelled>();
            for label in &labels {
                family.add(Instance::object(Arc::new(Labelled(label.clone()))));
            }
        }

        let container = Container::new(registry);
        let resolved: Vec<String> = container
            .get_all_instances::<Labelled>()
            .unwrap()
            .iter()
            .map(|l| l.0.clone())
            .collect();
        prop_assert_eq!(resolved, labels);
    }

    #[test]
    fn prop_decorators_wrap_in_registration_order(layers in prop::collection::vec("[A-Z][0-9]", 0..6)) {
        let mut registry = Registry::new();
        {
            let mut family = registry.for_type::<Decorated>();
            family.use_lambda(|_| Ok(Arc::new(Decorated { layers: Vec::new() })));
            for layer in &layers {
                let layer = layer.clone();
                family.decorate_all_with(&layer.clone(), move |inner| {
                    let mut applied = inner.layers.clone();
                    applied.push(layer.clone());
                    Arc::new(Decorated { layers: applied })
                });
            }
        }

        let container = Container::new(registry);
        let decorated = container.get_instance::<Decorated>().unwrap();
        prop_assert_eq!(&decorated.layers, &layers);
    }

    #[test]
    fn prop_singletons_are_built_once(requests in 1usize..20) {
        let mut registry = Registry::new();
        registry
            .for_type::<Labelled>()
            .use_lambda(|_| Ok(Arc::new(Labelled("only".to_string()))))
            .singleton();

        let container = Container::new(registry);
        let first = container.get_instance::<Labelled>().unwrap();
        for _ in 0..requests {
            prop_assert!(Arc::ptr_eq(&first, &container.get_instance::<Labelled>().unwrap()));
        }
    }
}
