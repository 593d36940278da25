//! Turns each [`CommandKind`] into the requests that carry it out.
//!
//! Every `apply_*` function runs inside the session the command manager
//! opened, so each request it submits becomes part of one undo step and an
//! error part-way through is rolled back by aborting that session.

use std::collections::BTreeMap;

use serde_json::Value;

use super::cascade::CascadePlan;
use super::{CommandContext, CommandKind, CommandOutput};
use crate::error::CommandError;
use crate::id::EntityId;
use crate::model::component::{Component, ComponentKind};
use crate::txn::Mutation;

pub(crate) fn apply(
    ctx: &mut CommandContext<'_>,
    kind: &CommandKind,
) -> Result<CommandOutput, CommandError> {
    match kind {
        CommandKind::CreateEntity {
            class_name,
            host,
            properties,
        } => apply_create_entity(ctx, class_name, *host, properties),
        CommandKind::DeleteEntity { entity } => apply_delete_entity(ctx, *entity),
        CommandKind::DeleteHost { host } => apply_delete_host(ctx, *host),
        CommandKind::MoveContent { entity, host } => apply_move_content(ctx, *entity, *host),
        CommandKind::SetProperty { entity, key, value } => {
            submit(
                ctx,
                Mutation::SetProperty {
                    entity: *entity,
                    key: key.clone(),
                    value: value.clone(),
                },
            )?;
            Ok(CommandOutput::default())
        }
        CommandKind::EditComponentField {
            entity,
            kind,
            field,
            value,
        } => apply_edit_component_field(ctx, *entity, *kind, field, value),
        CommandKind::ReplaceComponent { entity, component } => {
            apply_replace_component(ctx, *entity, component)
        }
    }
}

/// Build a request against the current document and commit it.
fn submit(ctx: &mut CommandContext<'_>, mutation: Mutation) -> Result<Option<EntityId>, CommandError> {
    let request = ctx
        .transactions
        .create_request(ctx.document, ctx.registry, mutation)?;
    Ok(ctx.transactions.commit(ctx.document, request)?)
}

fn apply_create_entity(
    ctx: &mut CommandContext<'_>,
    class_name: &str,
    host: Option<EntityId>,
    properties: &BTreeMap<String, Value>,
) -> Result<CommandOutput, CommandError> {
    let created = submit(
        ctx,
        Mutation::CreateEntity {
            class_name: class_name.to_string(),
            host,
        },
    )?;
    let mut output = CommandOutput::default();
    let Some(entity) = created else {
        return Ok(output);
    };
    for (key, value) in properties {
        submit(
            ctx,
            Mutation::SetProperty {
                entity,
                key: key.clone(),
                value: Some(value.clone()),
            },
        )?;
    }
    output.created.push(entity);
    Ok(output)
}

fn apply_delete_entity(
    ctx: &mut CommandContext<'_>,
    entity: EntityId,
) -> Result<CommandOutput, CommandError> {
    let removed = ctx.document.subtree(entity)?;
    submit(ctx, Mutation::DeleteEntity { entity })?;
    Ok(CommandOutput {
        removed,
        ..CommandOutput::default()
    })
}

fn apply_delete_host(
    ctx: &mut CommandContext<'_>,
    host: EntityId,
) -> Result<CommandOutput, CommandError> {
    // Plan first: classification and target errors surface before any request commits.
    let plan = CascadePlan::build(ctx.document, host)?;
    let mut output = CommandOutput::default();

    for &(content, target) in &plan.reassign {
        submit(
            ctx,
            Mutation::SetHost {
                entity: content,
                host: Some(target),
            },
        )?;
        output.reassigned.push((content, Some(target)));
    }
    for &content in &plan.partition.to_be_removed {
        output.removed.extend(ctx.document.subtree(content)?);
        submit(ctx, Mutation::DeleteEntity { entity: content })?;
    }
    submit(ctx, Mutation::DeleteEntity { entity: host })?;
    output.removed.push(host);

    tracing::info!(
        "deleted host {host}: {} removed, {} reassigned",
        output.removed.len(),
        output.reassigned.len()
    );
    Ok(output)
}

fn apply_move_content(
    ctx: &mut CommandContext<'_>,
    entity: EntityId,
    host: Option<EntityId>,
) -> Result<CommandOutput, CommandError> {
    submit(ctx, Mutation::SetHost { entity, host })?;
    Ok(CommandOutput {
        reassigned: vec![(entity, host)],
        ..CommandOutput::default()
    })
}

fn apply_edit_component_field(
    ctx: &mut CommandContext<'_>,
    entity: EntityId,
    kind: ComponentKind,
    field: &str,
    value: &Value,
) -> Result<CommandOutput, CommandError> {
    submit(
        ctx,
        Mutation::SetComponentField {
            entity,
            kind,
            field: field.to_string(),
            value: value.clone(),
        },
    )?;
    Ok(CommandOutput::default())
}

fn apply_replace_component(
    ctx: &mut CommandContext<'_>,
    entity: EntityId,
    component: &Component,
) -> Result<CommandOutput, CommandError> {
    submit(
        ctx,
        Mutation::AttachComponent {
            entity,
            component: component.clone(),
        },
    )?;
    Ok(CommandOutput::default())
}
