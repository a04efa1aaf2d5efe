//! Integration tests for the scene crate
//!
//! These tests cover:
//! - Loading a scene description from JSON
//! - The `SceneSource` view of a loaded scene
//! - Shader template libraries on disk

use std::fs;

use i3d_core::{BoundingVolumeMode, Error, NodeKind, ParamValue};
use i3d_scene::{
    AnimProperty, Interpolation, LightType, SceneDescription, SceneSource, ShaderLibrary,
    TextureKind,
};

/// Helper to build a small tractor scene as JSON
fn make_scene_json() -> String {
    r#"{
        "name": "tractor",
        "fps": 30,
        "roots": ["body"],
        "objects": [
            {
                "key": "body",
                "name": "Body",
                "kind": "shape",
                "children": ["wheel_l", "lamp"],
                "transform": { "translation": { "x": 0, "y": 0, "z": 1 } },
                "mesh": {
                    "positions": [[0,0,0],[1,0,0],[0,1,0]],
                    "triangles": [
                        { "corners": [{"vertex":0,"uv":[0,0]},{"vertex":1,"uv":[1,0]},{"vertex":2,"uv":[0,1]}] }
                    ]
                },
                "materials": [
                    {
                        "name": "paint",
                        "shader": "$data/shaders/vehicleShader.xml",
                        "parameters": { "diffuseColor": { "type": "color", "value": [0.8, 0.1, 0.1, 1] } },
                        "custom_parameters": { "colorScale": { "type": "vector", "value": [1, 0.5, 0.5] } },
                        "textures": [ { "kind": "diffuse", "path": "textures/paint.png" } ]
                    }
                ],
                "bounding_volume": { "mode": "sphere" },
                "attributes": { "castsShadows": { "type": "bool", "value": true } }
            },
            {
                "key": "wheel_l",
                "name": "WheelL",
                "kind": "shape",
                "parent": "body",
                "merge_group": "wheels",
                "animation": {
                    "curves": [
                        {
                            "property": "rotation_x",
                            "interpolation": "linear",
                            "keys": [ { "frame": 0, "value": 0 }, { "frame": 30, "value": 3.14159 } ]
                        }
                    ]
                }
            },
            {
                "key": "lamp",
                "kind": "light",
                "parent": "body",
                "light": { "type": "spot", "cone_angle": 45 },
                "visible": false
            }
        ]
    }"#
    .to_string()
}

mod description_tests {
    use super::*;

    #[test]
    fn test_load_from_json() {
        let scene = SceneDescription::from_json_str(&make_scene_json()).unwrap();

        assert_eq!(scene.scene_name(), "tractor");
        assert_eq!(scene.frames_per_second(), 30.0);
        assert_eq!(scene.root_keys(), &["body".to_string()]);
        assert_eq!(scene.object_count(), 3);

        let body = scene.object("body").unwrap();
        assert_eq!(body.kind, NodeKind::Shape);
        assert_eq!(body.display_name(), "Body");
        assert_eq!(body.transform.translation.z, 1.0);
        assert_eq!(body.transform.scale.x, 1.0);
        assert_eq!(body.bounding_volume.mode, BoundingVolumeMode::Sphere);
        assert_eq!(body.mesh.as_ref().unwrap().triangle_count(), 1);
        assert_eq!(body.attributes.get("castsShadows"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn test_materials() {
        let scene = SceneDescription::from_json_str(&make_scene_json()).unwrap();
        let material = &scene.object("body").unwrap().materials[0];

        assert_eq!(material.shader_key(), "$data/shaders/vehicleShader.xml");
        assert_eq!(material.textures[0].kind, TextureKind::Diffuse);
        assert_eq!(
            material.parameters.get("diffuseColor"),
            Some(&ParamValue::Color([0.8, 0.1, 0.1, 1.0]))
        );
        assert!(material.custom_parameters.contains_key("colorScale"));
    }

    #[test]
    fn test_defaults_for_sparse_objects() {
        let scene = SceneDescription::from_json_str(&make_scene_json()).unwrap();

        let wheel = scene.object("wheel_l").unwrap();
        assert!(wheel.visible);
        assert!(wheel.mesh.is_none());
        assert_eq!(wheel.merge_tag(), Some("wheels"));
        let curve = wheel
            .animation
            .as_ref()
            .and_then(|a| a.curve(AnimProperty::RotationX))
            .unwrap();
        assert_eq!(curve.interpolation, Interpolation::Linear);

        let lamp = scene.object("lamp").unwrap();
        assert_eq!(lamp.display_name(), "lamp");
        assert!(!lamp.visible);
        let light = lamp.light.as_ref().unwrap();
        assert_eq!(light.light_type, LightType::Spot);
        assert_eq!(light.cone_angle, 45.0);
        assert_eq!(light.range, 10.0);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let json = r#"{ "name": "x", "roots": [], "objects": [ { "key": "a" }, { "key": "a" } ] }"#;
        let err = SceneDescription::from_json_str(json).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let err = SceneDescription::from_json_str("{ name: }").unwrap_err();
        assert!(matches!(err, Error::SceneFormat { .. }));
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tractor.scene.json");
        let scene = SceneDescription::from_json_str(&make_scene_json()).unwrap();
        fs::write(&path, scene.to_json_string().unwrap()).unwrap();

        let loaded = SceneDescription::from_json_file(&path).unwrap();
        assert_eq!(loaded.objects, scene.objects);
        assert!(loaded.object("lamp").is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = SceneDescription::from_json_file("/nonexistent/scene.json").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}

mod shader_tests {
    use super::*;

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("vehicleShader.xml"),
            r#"<CustomShader><Parameters><Parameter name="colorScale" type="float3" defaultValue="1 1 1"/></Parameters></CustomShader>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("treeShader.xml"),
            r#"<CustomShader><Variations><Variation name="LEAVES"/></Variations></CustomShader>"#,
        )
        .unwrap();
        fs::write(dir.path().join("readme.txt"), "not a shader").unwrap();

        let library = ShaderLibrary::load_dir(dir.path()).unwrap();
        assert_eq!(library.len(), 2);
        let ids: Vec<&str> = library.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["treeShader", "vehicleShader"]);
        assert_eq!(
            library.default_for("vehicleShader", "colorScale"),
            Some(&ParamValue::Vector(vec![1.0, 1.0, 1.0]))
        );
        assert!(library.get("treeShader").unwrap().has_variation("LEAVES"));
    }

    #[test]
    fn test_broken_template_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.xml"), "<CustomShader>").unwrap();
        let err = ShaderLibrary::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ShaderTemplate { .. }));
    }
}
