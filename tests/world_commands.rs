// World-level behavior: the entity registry, command application, component
// registration, and the resource container.

use simtick::{
    Command, CommandError, ComponentType, DenseStrategy, EngineError, EntityId, EntityIdSlot,
    EntityRegistry, RegistrationError, World,
};

#[test]
fn registry_creates_live_ids_with_positive_generations() {
    let registry = EntityRegistry::new();
    let id = registry.create();

    assert!(id.generation() >= 1);
    assert!(registry.is_alive(id));
    assert_eq!(registry.count(), 1);
}

#[test]
fn destroy_invalidates_and_recycling_bumps_the_generation() {
    let registry = EntityRegistry::new();
    let first = registry.create();

    assert!(registry.destroy(first));
    assert!(!registry.is_alive(first));
    assert_eq!(registry.count(), 0);

    let second = registry.create();
    assert_eq!(second.index(), first.index());
    assert!(second.generation() > first.generation());
    assert!(registry.is_alive(second));
    assert!(!registry.is_alive(first));
}

#[test]
fn destroy_rejects_zero_and_stale_handles() {
    let registry = EntityRegistry::new();
    assert!(!registry.destroy(EntityId::ZERO));

    let id = registry.create();
    assert!(registry.destroy(id));
    // Second destroy of the same handle is stale.
    assert!(!registry.destroy(id));
}

#[test]
fn zero_id_is_never_alive() {
    let registry = EntityRegistry::new();
    assert!(!registry.is_alive(EntityId::ZERO));
    assert!(!registry.is_alive(EntityId::from_parts(99, 1)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn create_command_fills_the_slot() {
    let world = World::new();
    let slot = EntityIdSlot::new();

    world
        .apply_commands([Command::create_entity_into(slot.clone())])
        .unwrap();

    let id = slot.get().expect("slot filled");
    assert!(world.registry().is_alive(id));
}

#[test]
fn destroy_command_rejects_zero_and_stale() {
    let world = World::new();

    let err = world
        .apply_commands([Command::destroy_entity(EntityId::ZERO)])
        .unwrap_err();
    assert!(matches!(err, EngineError::Command(CommandError::ZeroEntity(_))));

    let err = world
        .apply_commands([Command::destroy_entity(EntityId::from_parts(3, 2))])
        .unwrap_err();
    assert!(matches!(err, EngineError::Command(CommandError::StaleEntity(_))));
}

#[test]
fn add_component_command_round_trip() {
    let world = World::new();
    world.register_component("pos", &DenseStrategy::new()).unwrap();
    let id = world.registry().create();

    world
        .apply_commands([Command::add_component(id, "pos", (1.0_f64, 2.0_f64))])
        .unwrap();

    let store = world.view_component(&ComponentType::new("pos")).unwrap();
    let value = store.get(id).unwrap();
    assert_eq!(*value.downcast_ref::<(f64, f64)>().unwrap(), (1.0, 2.0));

    world
        .apply_commands([Command::remove_component(id, "pos")])
        .unwrap();
    assert!(!store.has(id));

    // Removing an absent binding silently succeeds.
    world
        .apply_commands([Command::remove_component(id, "pos")])
        .unwrap();
}

#[test]
fn commands_against_unregistered_components_fail() {
    let world = World::new();
    let id = world.registry().create();

    let err = world
        .apply_commands([Command::add_component(id, "ghost", 1_u8)])
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Command(CommandError::ComponentNotRegistered(component))
            if component.as_str() == "ghost"
    ));
}

#[test]
fn batch_application_stops_at_the_first_failure() {
    let world = World::new();

    let err = world
        .apply_commands([
            Command::create_entity(),
            Command::destroy_entity(EntityId::from_parts(50, 1)),
            Command::create_entity(),
        ])
        .unwrap_err();
    assert!(matches!(err, EngineError::Command(CommandError::StaleEntity(_))));

    // The first create applied; the one after the failure did not.
    assert_eq!(world.registry().count(), 1);
}

#[test]
fn add_component_rejects_the_zero_entity() {
    let world = World::new();
    world.register_component("pos", &DenseStrategy::new()).unwrap();

    let err = world
        .apply_commands([Command::add_component(EntityId::ZERO, "pos", 0_u8)])
        .unwrap_err();
    assert!(matches!(err, EngineError::Command(CommandError::ZeroEntity(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Component registration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn component_registration_is_unique_per_world() {
    let world = World::new();
    world.register_component("pos", &DenseStrategy::new()).unwrap();

    let err = world
        .register_component("pos", &DenseStrategy::new())
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Registration(RegistrationError::ComponentAlreadyRegistered(component))
            if component.as_str() == "pos"
    ));
}

#[test]
fn view_of_unknown_component_fails() {
    let world = World::new();
    let err = world.view_component(&ComponentType::new("ghost")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Command(CommandError::ComponentNotRegistered(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn resources_round_trip() {
    let world = World::new();
    world.resources().insert("gravity", 9.81_f64);

    let gravity = world.resources().get_as::<f64>("gravity").unwrap();
    assert_eq!(*gravity, 9.81);
    assert!(world.resources().get("missing").is_none());

    world.resources().delete("gravity");
    assert!(world.resources().get("gravity").is_none());
}

#[test]
fn resource_range_visits_until_stopped() {
    let world = World::new();
    world.resources().insert("a", 1_i32);
    world.resources().insert("b", 2_i32);
    world.resources().insert("c", 3_i32);

    let mut names = Vec::new();
    world.resources().range(|name, _value| {
        names.push(name.to_string());
        true
    });
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);

    let mut visits = 0;
    world.resources().range(|_name, _value| {
        visits += 1;
        false
    });
    assert_eq!(visits, 1);
}
