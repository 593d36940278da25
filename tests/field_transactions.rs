mod common;

use common::{editor_with_beam_site, snapshot};
use floorplan_txn::model::TreeRun;
use floorplan_txn::{Command, CommandError, CommandKind, Component, ComponentKind, TxnError};
use serde_json::json;

fn cold_water(diameter: f64) -> Component {
    Component::ColdWater(TreeRun {
        nodes: vec![],
        diameter,
    })
}

#[test]
fn tree_components_reject_field_edits() {
    let (mut editor, site) = editor_with_beam_site(0, 0, 1);
    let pipe = site.contents[0];
    editor
        .execute(Command::new(CommandKind::ReplaceComponent {
            entity: pipe,
            component: cold_water(0.02),
        }))
        .unwrap();
    let before = snapshot(&editor);
    let steps = editor.history().len();

    let err = editor
        .execute(Command::new(CommandKind::EditComponentField {
            entity: pipe,
            kind: ComponentKind::ColdWater,
            field: "diameter".to_string(),
            value: json!(0.04),
        }))
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Txn(TxnError::FieldTransactionRejected { entity, .. }) if entity == pipe
    ));
    assert_eq!(snapshot(&editor), before);
    assert_eq!(editor.history().len(), steps);
}

#[test]
fn whole_component_replacement_is_accepted_and_reversible() {
    let (mut editor, site) = editor_with_beam_site(0, 0, 1);
    let pipe = site.contents[0];
    editor
        .execute(Command::new(CommandKind::ReplaceComponent {
            entity: pipe,
            component: cold_water(0.02),
        }))
        .unwrap();
    editor
        .execute(Command::new(CommandKind::ReplaceComponent {
            entity: pipe,
            component: cold_water(0.04),
        }))
        .unwrap();
    assert_eq!(
        editor.document().component(pipe, ComponentKind::ColdWater),
        Some(&cold_water(0.04))
    );
    editor.undo().unwrap();
    assert_eq!(
        editor.document().component(pipe, ComponentKind::ColdWater),
        Some(&cold_water(0.02))
    );
}

#[test]
fn every_kind_reports_its_capabilities() {
    for kind in ComponentKind::ALL {
        let tree = matches!(
            kind,
            ComponentKind::ColdWater | ComponentKind::HotWater | ComponentKind::WeakElec
        );
        assert_eq!(kind.can_transact_field(), !tree, "{kind}");
        assert_eq!(kind.need_dump(), *kind != ComponentKind::Hole, "{kind}");
    }
}

#[test]
fn joint_field_edit_validates_shape() {
    let (mut editor, site) = editor_with_beam_site(0, 0, 0);
    let err = editor
        .dispatch(
            "edit_component_field",
            &[json!(site.beam), json!("Joint"), json!("angle"), json!("steep")],
        )
        .unwrap_err();
    assert!(matches!(err, CommandError::Txn(TxnError::Document(_))));

    editor
        .dispatch(
            "edit_component_field",
            &[json!(site.beam), json!("Joint"), json!("angle"), json!(30.0)],
        )
        .unwrap();
    assert_eq!(
        editor
            .document()
            .component_field(site.beam, ComponentKind::Joint, "angle")
            .unwrap(),
        json!(30.0)
    );
}
