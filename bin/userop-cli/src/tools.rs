use std::{fs, io::Read, path::Path};

use anyhow::Context;
use serde_json::json;
use userop_core::{
    AuthorizationTupleOrder, UserOperationDraft, authorization_tuple, parse_selector_list,
};

use crate::config::{AuthorizeArgs, GlobalArgs, HashArgs, SelectorsArgs};

pub(crate) fn selectors(args: &SelectorsArgs) -> anyhow::Result<()> {
    let entries = parse_selector_list(&args.input)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

pub(crate) async fn authorize(global: &GlobalArgs, args: &AuthorizeArgs) -> anyhow::Result<()> {
    let signer = global.signer()?;
    let signed = signer.sign_authorization(args.delegate, global.chain_id, args.nonce).await?;
    let output = json!({
        "authority": signer.address(),
        "authorization": signed,
        "tuple": authorization_tuple(&signed, args.order),
        "parityFirst": authorization_tuple(&signed, AuthorizationTupleOrder::ParityFirst),
        "signatureFirst": authorization_tuple(&signed, AuthorizationTupleOrder::SignatureFirst),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub(crate) fn read_draft(path: Option<&Path>) -> anyhow::Result<UserOperationDraft> {
    let raw = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    serde_json::from_str(&raw).context("not a JSON user operation")
}

pub(crate) fn hash(global: &GlobalArgs, args: &HashArgs) -> anyhow::Result<()> {
    let draft = read_draft(args.file.as_deref())?;
    let hash = draft.hash(global.entry_point_version, global.entry_point(), global.chain_id)?;
    println!("{hash}");
    Ok(())
}
