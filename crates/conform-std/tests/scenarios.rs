//! Integration tests: end-to-end validation scenarios through the standard
//! extension, exercising the whole stack from `Context` down to the
//! coalescing of nested results.

use std::rc::Rc;

use serde_json::{json, Value};

use conform_core::{
    ChildrenInput, CoercionFn, Context, EnumOption, Extension, Model, Path, Phase, SchemaError,
    ValidateOptions, ValidationResult,
};

fn ctx() -> Context {
    conform_std::context().unwrap()
}

#[test]
fn test_required_missing_is_one_error() {
    let out = ctx().model("string").unwrap().required().validate(None).unwrap();
    assert!(!out.conforms());
    assert_eq!(out.errors().len(), 1);
    assert_eq!(out.errors()[0].message, "expected value to be defined");
    assert!(out.value().is_none());
}

#[test]
fn test_required_wins_over_default() {
    // A required field with a default still rejects a missing input; the
    // default never masks the requirement.
    let out = ctx()
        .model("number")
        .unwrap()
        .required()
        .with_default(json!(7))
        .validate(None)
        .unwrap();
    assert!(!out.conforms());
    assert_eq!(out.errors()[0].message, "expected value to be defined");

    let optional = ctx()
        .model("number")
        .unwrap()
        .with_default(json!(7))
        .validate(None)
        .unwrap();
    assert!(optional.conforms());
    assert_eq!(optional.value(), Some(&json!(7)));
}

#[test]
fn test_object_coercion_with_one_bad_field() {
    let c = ctx();
    let schema = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![
            ("age".into(), c.model("number").unwrap().required()),
            ("name".into(), c.model("string").unwrap().required()),
        ]))
        .unwrap();

    let out = schema
        .validate(Some(&json!({"age": "30", "name": 12})))
        .unwrap();
    assert!(!out.conforms());
    // The age still coerced; only the name failed.
    assert_eq!(out.value(), Some(&json!({"age": 30, "name": 12})));
    assert_eq!(out.errors().len(), 1);
    assert_eq!(out.errors()[0].path, Some(Path::root().child_key("name")));
    assert_eq!(out.errors()[0].message, "expected value to be a string");
}

#[test]
fn test_enum_ordered_trial() {
    let c = ctx();
    let id_by_number = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![(
            "id".into(),
            c.builder("integer").unwrap().required(),
        )]))
        .unwrap();
    let id_by_uuid = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![(
            "id".into(),
            c.builder("uuid").unwrap().required(),
        )]))
        .unwrap();
    let schema = c
        .model("object")
        .unwrap()
        .options(vec![
            EnumOption::Model(Box::new(id_by_number)),
            EnumOption::Model(Box::new(id_by_uuid)),
        ])
        .unwrap();

    // First option wins, including its coercions.
    let first = schema.validate(Some(&json!({"id": "12"}))).unwrap();
    assert!(first.conforms());
    assert_eq!(first.value(), Some(&json!({"id": 12})));

    // Second option accepts what the first rejects.
    let second = schema
        .validate(Some(&json!({"id": "6f1c24b2-58a4-4e42-9c7e-2f3a5b1d9e00"})))
        .unwrap();
    assert!(second.conforms());

    // Neither matches: one violation aggregating every option's failures.
    let neither = schema.validate(Some(&json!({"id": true}))).unwrap();
    assert!(!neither.conforms());
    assert_eq!(neither.errors().len(), 1);
    assert!(neither.errors()[0].details.as_ref().is_some_and(|d| d.len() >= 2));
}

#[test]
fn test_array_with_null_element() {
    let c = ctx();
    let schema = c
        .model("array")
        .unwrap()
        .children(ChildrenInput::Element(c.model("number").unwrap().required()))
        .unwrap();
    let out = schema.validate(Some(&json!(["1", 2, null]))).unwrap();
    assert!(!out.conforms());
    assert_eq!(out.value(), Some(&json!([1, 2, null])));
    assert_eq!(out.errors().len(), 1);
    assert_eq!(out.errors()[0].message, "expected value to be non-null");
    assert_eq!(out.errors()[0].path, Some(Path::root().child_index(2)));
}

#[test]
fn test_strict_object_rejects_leftovers() {
    let c = ctx();
    let schema = c
        .model("object")
        .unwrap()
        .strict()
        .children(ChildrenInput::Keyed(vec![(
            "known".into(),
            c.model("string").unwrap(),
        )]))
        .unwrap();
    let out = schema
        .validate(Some(&json!({"known": "x", "extra": 1, "more": 2})))
        .unwrap();
    assert!(!out.conforms());
    // One violation per leftover key.
    assert_eq!(out.errors().len(), 2);
    let paths: Vec<_> = out.errors().iter().map(|e| e.path.clone()).collect();
    assert!(paths.contains(&Some(Path::root().child_key("extra"))));
    assert!(paths.contains(&Some(Path::root().child_key("more"))));
}

#[test]
fn test_non_strict_object_passes_leftovers_through() {
    let c = ctx();
    let schema = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![(
            "known".into(),
            c.model("string").unwrap(),
        )]))
        .unwrap();
    let out = schema.validate(Some(&json!({"known": "x", "extra": 1}))).unwrap();
    assert!(out.conforms());
    assert_eq!(out.value(), Some(&json!({"known": "x", "extra": 1})));
}

#[test]
fn test_fail_loudly() {
    let schema = ctx().model("number").unwrap().required();
    let err = schema
        .validate_with(None, ValidateOptions { fail_loudly: true })
        .unwrap_err();
    match err {
        SchemaError::ValidationFailed { violations, .. } => {
            assert_eq!(violations.len(), 1);
            assert!(violations.to_string().contains("(root)"));
        }
        other => panic!("expected ValidationFailed, got {other}"),
    }

    // Conforming input returns the result unchanged.
    let ok = schema
        .validate_with(Some(&json!(1)), ValidateOptions { fail_loudly: true })
        .unwrap();
    assert!(ok.conforms());
}

#[test]
fn test_cross_field_read_in_declaration_order() {
    let c = ctx();
    let currency_default: CoercionFn = Rc::new(|r: &mut ValidationResult| {
        // Derive a missing currency from the already-validated country.
        if r.value().is_none() {
            let derived = match r.root_at(&Path::root().child_key("country")) {
                Some(Value::String(ref s)) if s == "GB" => Some(json!("GBP")),
                Some(_) => Some(json!("USD")),
                None => None,
            };
            r.set_value(derived);
        }
        Ok(())
    });
    let schema = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![
            ("country".into(), c.model("string").unwrap().required()),
            (
                "currency".into(),
                c.model("string").unwrap().coerce(Phase::Parse, currency_default),
            ),
        ]))
        .unwrap();

    let out = schema.validate(Some(&json!({"country": "GB"}))).unwrap();
    assert!(out.conforms());
    assert_eq!(out.value(), Some(&json!({"country": "GB", "currency": "GBP"})));
}

#[test]
fn test_report_shape_is_stable() {
    let out = ctx()
        .model("string")
        .unwrap()
        .required()
        .validate(Some(&json!(9)))
        .unwrap();
    let report = out.to_json();
    assert_eq!(report["conforms"], json!(false));
    assert_eq!(report["value"], json!(9));
    assert_eq!(report["errors"][0]["message"], "expected value to be a string");
    assert_eq!(report["errors"][0]["path"], json!([]));
    assert_eq!(report["errors"][0]["actual"], json!(9));
}

#[test]
fn test_cloned_models_are_independent() {
    let c = ctx();
    let base = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![(
            "name".into(),
            c.model("string").unwrap(),
        )]))
        .unwrap();
    let stricter = base.clone().strict().merge(
        &c.model("object")
            .unwrap()
            .children(ChildrenInput::Keyed(vec![(
                "id".into(),
                c.builder("integer").unwrap().required(),
            )]))
            .unwrap(),
    )
    .unwrap();

    // The original still accepts what the derived model rejects.
    let input = json!({"name": "a", "surprise": true});
    assert!(base.validate(Some(&input)).unwrap().conforms());
    assert!(!stricter.validate(Some(&input)).unwrap().conforms());
}

#[test]
fn test_pick_produces_a_narrower_schema() {
    let c = ctx();
    let full = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![
            ("id".into(), c.builder("integer").unwrap().required()),
            ("email".into(), c.builder("email").unwrap().required()),
            ("bio".into(), c.model("string").unwrap()),
        ]))
        .unwrap();
    let login = full.clone().pick(&["email"]).unwrap().strict();

    // The narrowed schema no longer requires id; the full one still does.
    let out = login.validate(Some(&json!({"email": "a@b.co"}))).unwrap();
    assert!(out.conforms());
    assert!(!full.validate(Some(&json!({"email": "a@b.co"}))).unwrap().conforms());
}

#[test]
fn test_later_extension_does_not_affect_existing_models() {
    let mut c = ctx();
    let before = c.model("string").unwrap();
    c.use_extension(
        Extension::new().with_defaults(conform_core::SpecDefaults {
            required: Some(true),
            ..Default::default()
        }),
    )
    .unwrap();
    let after = c.model("string").unwrap();

    // The earlier model kept the snapshot it was built with.
    assert!(before.validate(None).unwrap().conforms());
    assert!(!after.validate(None).unwrap().conforms());
}

#[test]
fn test_nested_document_end_to_end() {
    let c = ctx();
    let tag = c.model("string").unwrap().required();
    let schema = c
        .model("object")
        .unwrap()
        .strict()
        .children(ChildrenInput::Keyed(vec![
            ("id".into(), c.builder("integer").unwrap().required()),
            ("email".into(), c.builder("email").unwrap().required()),
            ("joined".into(), c.builder("iso8601").unwrap().required()),
            (
                "tags".into(),
                c.model("array")
                    .unwrap()
                    .children(ChildrenInput::Element(tag))
                    .unwrap()
                    .max(4.0),
            ),
            ("nickname".into(), c.model("string").unwrap().nullable()),
        ]))
        .unwrap();

    let out = schema
        .validate(Some(&json!({
            "id": "41",
            "email": "dev@example.org",
            "joined": "2024-06-01T09:30:00+02:00",
            "tags": ["rust", "schemas"],
            "nickname": null,
        })))
        .unwrap();
    assert!(out.conforms(), "unexpected errors: {:?}", out.errors());
    assert_eq!(
        out.value(),
        Some(&json!({
            "id": 41,
            "email": "dev@example.org",
            "joined": "2024-06-01T07:30:00Z",
            "tags": ["rust", "schemas"],
            "nickname": null,
        }))
    );

    let bad = schema
        .validate(Some(&json!({
            "id": "x",
            "email": "nope",
            "joined": "yesterday",
            "tags": ["a", "b", "c", "d", "e"],
            "bogus": 1,
        })))
        .unwrap();
    assert!(!bad.conforms());
    let paths: Vec<String> = bad
        .errors()
        .iter()
        .filter_map(|e| e.path.as_ref().map(|p| p.to_string()))
        .collect();
    assert!(paths.contains(&"id".to_string()));
    assert!(paths.contains(&"email".to_string()));
    assert!(paths.contains(&"joined".to_string()));
    assert!(paths.contains(&"tags".to_string()));
    assert!(paths.contains(&"bogus".to_string()));
}

#[test]
fn test_validator_reusable_across_runs() {
    let c = ctx();
    let schema = c.model("number").unwrap().required();
    // Repeated validations of one model never interfere.
    let a = schema.validate(Some(&json!("1"))).unwrap();
    let b = schema.validate(None).unwrap();
    let c2 = schema.validate(Some(&json!(3))).unwrap();
    assert_eq!(a.value(), Some(&json!(1)));
    assert!(!b.conforms());
    assert!(c2.conforms());
}

#[test]
fn test_input_value_is_never_mutated() {
    let c = ctx();
    let schema = c
        .model("object")
        .unwrap()
        .children(ChildrenInput::Keyed(vec![(
            "n".into(),
            c.model("number").unwrap(),
        )]))
        .unwrap();
    let input = json!({"n": "5"});
    let out = schema.validate(Some(&input)).unwrap();
    assert_eq!(out.value(), Some(&json!({"n": 5})));
    // The caller's value is untouched.
    assert_eq!(input, json!({"n": "5"}));
}

#[test]
fn test_enum_discriminator_with_std_types() {
    let c = ctx();
    let has_id: conform_core::AppliesFn = Rc::new(|r: &ValidationResult| {
        matches!(r.value(), Some(Value::Object(m)) if m.contains_key("id"))
    });
    let by_id: Model = c
        .model("object")
        .unwrap()
        .applies(has_id)
        .children(ChildrenInput::Keyed(vec![(
            "id".into(),
            c.builder("integer").unwrap().required(),
        )]))
        .unwrap();
    let lenient = c.model("object").unwrap();
    let schema = c
        .model("object")
        .unwrap()
        .options(vec![
            EnumOption::Model(Box::new(by_id)),
            EnumOption::Model(Box::new(lenient)),
        ])
        .unwrap();

    let routed = schema.validate(Some(&json!({"id": "5"}))).unwrap();
    assert!(routed.conforms());
    assert_eq!(routed.value(), Some(&json!({"id": 5})));
    assert!(schema.validate(Some(&json!({"name": "x"}))).unwrap().conforms());

    // The discriminator claims id-bearing objects exclusively, pass or
    // fail; the lenient fallback never gets a turn.
    let claimed = schema.validate(Some(&json!({"id": true}))).unwrap();
    assert!(!claimed.conforms());
    assert_eq!(
        claimed.errors()[0].path,
        Some(Path::root().child_key("id"))
    );
}
