//! Annotation Service Tests
//!
//! Notes and arrows attached to positions: input normalization, lookups of
//! missing records, and removal together with the annotated subtree.

#[cfg(test)]
mod annotation_tests {
    use anyhow::Result;
    use movetree_core::db::MemoryStore;
    use movetree_core::{
        AnnotationService, ArrowColor, ChessMove, FileService, PositionNode, TreeEngine,
        TreeError, MAX_NOTE_LEN,
    };
    use std::sync::Arc;
    use tokio_test::assert_err;

    struct Fixture {
        engine: TreeEngine,
        annotations: AnnotationService,
        root: PositionNode,
        child: PositionNode,
    }

    async fn setup() -> Result<Fixture> {
        let store = Arc::new(MemoryStore::new());
        let engine = TreeEngine::new(store.clone());
        let annotations = AnnotationService::from_store(store.clone());
        let file = FileService::new(store).create_file("Annotated", None).await?;

        let root = engine.create_root(&file.id, "start".to_string()).await?;
        let child = engine
            .create_child(&root.id, "e4".to_string(), ChessMove::new("e2e4"), None)
            .await?;

        Ok(Fixture {
            engine,
            annotations,
            root,
            child,
        })
    }

    #[tokio::test]
    async fn test_note_lifecycle() -> Result<()> {
        let fx = setup().await?;

        let note = fx.annotations.create_note(&fx.child.id, "  King's pawn  ").await?;
        assert_eq!(note.text, "King's pawn");
        assert!(note.updated_at.is_none());

        let edited = fx.annotations.update_note(&note.id, "Best by test").await?;
        assert_eq!(edited.text, "Best by test");
        assert!(edited.updated_at.is_some());
        assert_eq!(edited.created_at, note.created_at);

        assert_eq!(fx.annotations.list_notes(&fx.child.id).await?, vec![edited]);

        fx.annotations.delete_note(&note.id).await?;
        assert!(fx.annotations.list_notes(&fx.child.id).await?.is_empty());

        let err = assert_err!(fx.annotations.delete_note(&note.id).await);
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_note_text_rules() -> Result<()> {
        let fx = setup().await?;

        let err = assert_err!(fx.annotations.create_note(&fx.child.id, "   ").await);
        assert!(matches!(err, TreeError::Validation(_)));

        let too_long = "x".repeat(MAX_NOTE_LEN + 1);
        let err = assert_err!(fx.annotations.create_note(&fx.child.id, &too_long).await);
        assert!(matches!(err, TreeError::Validation(_)));

        let longest = "x".repeat(MAX_NOTE_LEN);
        fx.annotations.create_note(&fx.child.id, &longest).await?;

        let note = fx.annotations.create_note(&fx.root.id, "ok").await?;
        let err = assert_err!(fx.annotations.update_note(&note.id, "").await);
        assert!(matches!(err, TreeError::Validation(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_annotations_require_existing_node() -> Result<()> {
        let fx = setup().await?;

        let err = assert_err!(fx.annotations.create_note("missing", "text").await);
        assert!(err.is_not_found());

        let err = assert_err!(fx.annotations.create_arrow("missing", "e2", "e4", "red").await);
        assert!(err.is_not_found());

        let err = assert_err!(fx.annotations.list_notes("missing").await);
        assert!(err.is_not_found());

        let err = assert_err!(fx.annotations.update_note("missing", "text").await);
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_arrow_normalization_and_validation() -> Result<()> {
        let fx = setup().await?;

        let arrow = fx
            .annotations
            .create_arrow(&fx.child.id, " G1", "f3 ", "Green")
            .await?;
        assert_eq!(arrow.from_square, "g1");
        assert_eq!(arrow.to_square, "f3");
        assert_eq!(arrow.color, ArrowColor::Green);

        for (from, to, color) in [
            ("e2", "e2", "red"),
            ("i9", "e4", "red"),
            ("e2", "e4", "purple"),
        ] {
            let err = assert_err!(
                fx.annotations
                    .create_arrow(&fx.child.id, from, to, color)
                    .await
            );
            assert!(matches!(err, TreeError::Validation(_)), "{} {} {}", from, to, color);
        }

        assert_eq!(fx.annotations.list_arrows(&fx.child.id).await?, vec![arrow.clone()]);
        fx.annotations.delete_arrow(&arrow.id).await?;
        assert!(fx.annotations.list_arrows(&fx.child.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_annotations_removed_with_subtree() -> Result<()> {
        let fx = setup().await?;
        let reply = fx
            .engine
            .create_child(&fx.child.id, "e5".to_string(), ChessMove::new("e7e5"), None)
            .await?;

        let note = fx.annotations.create_note(&reply.id, "Symmetrical").await?;
        fx.annotations
            .create_arrow(&fx.child.id, "d1", "h5", "red")
            .await?;
        let root_note = fx.annotations.create_note(&fx.root.id, "Start").await?;

        fx.engine.delete_subtree(&fx.child.id).await?;

        let err = assert_err!(fx.annotations.update_note(&note.id, "gone").await);
        assert!(err.is_not_found());
        assert_eq!(fx.annotations.list_notes(&fx.root.id).await?, vec![root_note]);
        Ok(())
    }
}
