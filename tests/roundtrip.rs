//! Round-trip identity through complete containers: built-in scalar
//! marshalers and reflection-derived struct marshalers.

use fbom::{ClassDescriptor, ClassMember, MarshalRegistry};

#[derive(Debug, Default, Clone, PartialEq)]
struct Transform {
    x: f32,
    y: f32,
    z: f32,
    frame: u64,
}

fn transform_class() -> ClassDescriptor {
    ClassDescriptor::new::<Transform>("Transform")
        .with_member(ClassMember::field(
            "x",
            "f32",
            |t: &Transform| t.x,
            |t: &mut Transform, v| t.x = v,
        ))
        .with_member(ClassMember::field(
            "y",
            "f32",
            |t: &Transform| t.y,
            |t: &mut Transform, v| t.y = v,
        ))
        .with_member(ClassMember::field(
            "z",
            "f32",
            |t: &Transform| t.z,
            |t: &mut Transform, v| t.z = v,
        ))
        .with_member(
            ClassMember::field(
                "frame",
                "u64",
                |t: &Transform| t.frame,
                |t: &mut Transform, v| t.frame = v,
            )
            .with_attribute("ignore", "true"),
        )
}

#[test]
fn scalar_round_trips() {
    let registry = MarshalRegistry::with_builtins();

    let bytes = fbom::to_bytes(&registry, &42u32).unwrap();
    assert_eq!(*fbom::from_bytes::<u32>(&registry, &bytes).unwrap(), 42);

    let bytes = fbom::to_bytes(&registry, &-7i64).unwrap();
    assert_eq!(*fbom::from_bytes::<i64>(&registry, &bytes).unwrap(), -7);

    let bytes = fbom::to_bytes(&registry, &1.5f64).unwrap();
    assert_eq!(*fbom::from_bytes::<f64>(&registry, &bytes).unwrap(), 1.5);

    let bytes = fbom::to_bytes(&registry, &true).unwrap();
    assert!(*fbom::from_bytes::<bool>(&registry, &bytes).unwrap());
}

#[test]
fn string_round_trips() {
    let registry = MarshalRegistry::with_builtins();
    let bytes = fbom::to_bytes(&registry, &"models/".to_string()).unwrap();
    assert_eq!(
        *fbom::from_bytes::<String>(&registry, &bytes).unwrap(),
        "models/"
    );
}

#[test]
fn reflected_struct_round_trips() {
    let mut registry = MarshalRegistry::with_builtins();
    registry.register_class(transform_class());

    let original = Transform {
        x: 1.0,
        y: 2.0,
        z: -3.5,
        frame: 99,
    };
    let bytes = fbom::to_bytes(&registry, &original).unwrap();
    let restored = fbom::from_bytes::<Transform>(&registry, &bytes).unwrap();

    assert_eq!(restored.x, original.x);
    assert_eq!(restored.y, original.y);
    assert_eq!(restored.z, original.z);
    // `frame` is tagged ignore and comes back at its Default value.
    assert_eq!(restored.frame, 0);
}

#[test]
fn nested_reflected_structs_round_trip() {
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Bounds {
        radius: f32,
    }
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Mesh {
        name: String,
        bounds: Bounds,
        vertex_count: u32,
    }

    let mut registry = MarshalRegistry::with_builtins();
    registry.register_class(ClassDescriptor::new::<Bounds>("Bounds").with_member(
        ClassMember::field(
            "radius",
            "f32",
            |b: &Bounds| b.radius,
            |b: &mut Bounds, v| b.radius = v,
        ),
    ));
    registry.register_class(
        ClassDescriptor::new::<Mesh>("Mesh")
            .with_member(ClassMember::field(
                "name",
                "String",
                |m: &Mesh| m.name.clone(),
                |m: &mut Mesh, v| m.name = v,
            ))
            .with_member(ClassMember::field(
                "bounds",
                "Bounds",
                |m: &Mesh| m.bounds.clone(),
                |m: &mut Mesh, v| m.bounds = v,
            ))
            .with_member(ClassMember::field(
                "vertex_count",
                "u32",
                |m: &Mesh| m.vertex_count,
                |m: &mut Mesh, v| m.vertex_count = v,
            )),
    );

    let original = Mesh {
        name: "rock_01".into(),
        bounds: Bounds { radius: 4.25 },
        vertex_count: 1024,
    };
    let bytes = fbom::to_bytes(&registry, &original).unwrap();
    let restored = fbom::from_bytes::<Mesh>(&registry, &bytes).unwrap();
    assert_eq!(*restored, original);
}

#[test]
fn unregistered_type_fails_to_serialize() {
    #[derive(Default)]
    struct Opaque;
    let registry = MarshalRegistry::with_builtins();
    assert!(fbom::to_bytes(&registry, &Opaque).is_err());
}
