//! File primitive - the primary/secondary credential inputs

use cdp_adapter::{NodeId, Scope};
use std::path::Path;
use tracing::{info, warn};

use super::Actions;
use crate::errors::ActionError;

const FILE_INPUTS: &str = "input[type='file']";

/// Which of the two file inputs received a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Both,
    PrimaryOnly,
}

impl<'a> Actions<'a> {
    /// Sets `primary` on the first file input and `secondary` on the second.
    ///
    /// Mapping entries are tried first; when they yield fewer than two
    /// distinct inputs the page's file inputs are taken in DOM order.
    pub async fn set_file_pair(
        &self,
        scope: &Scope,
        primary_key: &str,
        secondary_key: &str,
        primary: &Path,
        secondary: &Path,
    ) -> Result<FileOutcome, ActionError> {
        let (first, second) = self
            .file_targets(scope, primary_key, secondary_key)
            .await?;
        let Some(first) = first else {
            return Err(ActionError::NotFound("no file input on page".to_string()));
        };

        self.dom().set_files(first, &[primary.to_path_buf()]).await?;
        info!(key = %primary_key, file = %primary.display(), "primary file set");

        match second {
            Some(second) => {
                self.dom()
                    .set_files(second, &[secondary.to_path_buf()])
                    .await?;
                info!(key = %secondary_key, file = %secondary.display(), "secondary file set");
                Ok(FileOutcome::Both)
            }
            None => {
                warn!(
                    key = %secondary_key,
                    "only one file input present; secondary file not set"
                );
                Ok(FileOutcome::PrimaryOnly)
            }
        }
    }

    async fn file_targets(
        &self,
        scope: &Scope,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<(Option<NodeId>, Option<NodeId>), ActionError> {
        let resolver = self.resolver();
        let primary = resolver.resolve_all(scope, primary_key).await?;
        let secondary = resolver.resolve_all(scope, secondary_key).await?;

        let first = primary.first().copied();
        let second = match first {
            Some(first) => secondary
                .iter()
                .chain(primary.iter().skip(1))
                .copied()
                .find(|n| *n != first),
            None => None,
        };
        if first.is_some() && second.is_some() {
            return Ok((first, second));
        }

        let ordinal = self.dom().query(scope, FILE_INPUTS).await?;
        if ordinal.len() >= 2 || first.is_none() {
            return Ok((ordinal.first().copied(), ordinal.get(1).copied()));
        }
        Ok((first, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ActionTimings;
    use action_locator::{FieldMapping, Resolver, WaitBudgets};
    use cdp_adapter::memory::{Document, DomEvent, El};
    use cdp_adapter::MemoryDom;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn file_input() -> El {
        El::new("input").attr("type", "file").hidden()
    }

    async fn run(doc: Document, mapping: FieldMapping) -> (Result<FileOutcome, ActionError>, Vec<DomEvent>) {
        let dom = MemoryDom::new(doc);
        let resolver = Resolver::new(&dom, &mapping, CancellationToken::new())
            .with_budgets(WaitBudgets::fast());
        let actions = Actions::new(resolver).with_timings(ActionTimings::fast());
        let out = actions
            .set_file_pair(
                &Scope::Page,
                "_login_cer_file_input",
                "_login_key_file_input",
                Path::new("/fiel/empresa.cer"),
                Path::new("/fiel/empresa.key"),
            )
            .await;
        (out, dom.events())
    }

    #[tokio::test]
    async fn generic_selector_yields_both_in_dom_order() {
        let mut doc = Document::default();
        let cer = doc.add(file_input());
        let key = doc.add(file_input());
        let mapping = FieldMapping::default()
            .with("_login_cer_file_input", &["input[type='file']"])
            .unwrap()
            .with("_login_key_file_input", &["input[type='file']"])
            .unwrap();
        let (out, events) = run(doc, mapping).await;
        assert_eq!(out.unwrap(), FileOutcome::Both);
        assert_eq!(
            events,
            vec![
                DomEvent::FilesSet(cer, vec![PathBuf::from("/fiel/empresa.cer")]),
                DomEvent::FilesSet(key, vec![PathBuf::from("/fiel/empresa.key")]),
            ]
        );
    }

    #[tokio::test]
    async fn falls_back_to_ordinal_inputs() {
        let mut doc = Document::default();
        doc.add(file_input());
        doc.add(file_input());
        let (out, events) = run(doc, FieldMapping::default()).await;
        assert_eq!(out.unwrap(), FileOutcome::Both);
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn single_input_gets_primary_only() {
        let mut doc = Document::default();
        doc.add(file_input());
        let (out, events) = run(doc, FieldMapping::default()).await;
        assert_eq!(out.unwrap(), FileOutcome::PrimaryOnly);
        assert_eq!(events.len(), 1);

        let (out, _) = run(Document::default(), FieldMapping::default()).await;
        assert!(matches!(out, Err(ActionError::NotFound(_))));
    }
}
