//! Priority search over time-slot buttons

use tracing::debug;

use crate::dom::{ButtonHandle, DomResult, PageDom};
use crate::locator::attempt_click;

/// A slot button together with the priority label it was found by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMatch {
    pub button: ButtonHandle,
    pub label: String,
}

/// Find the button for the most preferred label present on the page.
///
/// Labels are tried in priority order and the first label with any matching
/// button wins, wherever that button sits in the document. Within one label
/// the first button in DOM order is taken.
pub async fn find_preferred_slot(
    dom: &dyn PageDom,
    labels: &[String],
) -> DomResult<Option<SlotMatch>> {
    for label in labels {
        if let Some(button) = dom.find_by_text_substring(label).await?.into_iter().next() {
            debug!(label = %label, index = button.index, "preferred slot present");
            return Ok(Some(SlotMatch {
                button,
                label: label.clone(),
            }));
        }
    }
    Ok(None)
}

/// Click the first clickable button after `anchor` in the anchor's container.
///
/// Only later siblings are considered: the container lists slots in
/// chronological order and an earlier slot is never an acceptable substitute.
/// Returns the clicked button, or `None` when nothing after the anchor could
/// be clicked.
pub async fn find_alternative(
    dom: &dyn PageDom,
    anchor: &ButtonHandle,
) -> DomResult<Option<ButtonHandle>> {
    let siblings = dom.container_buttons(anchor).await?;
    let Some(start) = siblings.iter().position(|b| b.index == anchor.index) else {
        debug!(anchor = %anchor.label(), "anchor no longer in its container");
        return Ok(None);
    };

    for candidate in &siblings[start + 1..] {
        if attempt_click(dom, candidate).await? {
            return Ok(Some(candidate.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::{FakeButton, FakePage};

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn earliest_label_wins_regardless_of_dom_position() {
        let page = FakePage::new(
            "https://example.test/entry",
            vec![
                FakeButton::new("10:00～10:30"),
                FakeButton::new("11:00～11:30"),
                FakeButton::new("14:00～14:30"),
            ],
        );

        let found = find_preferred_slot(&page, &labels(&["14:00～14:30", "10:00～10:30"]))
            .await
            .unwrap()
            .expect("slot present");

        assert_eq!(found.label, "14:00～14:30");
        assert_eq!(found.button.index, 2);
    }

    #[tokio::test]
    async fn falls_through_missing_labels() {
        let page = FakePage::new(
            "https://example.test/entry",
            vec![FakeButton::new("残り僅か 13:00～13:30")],
        );

        let found = find_preferred_slot(&page, &labels(&["12:00～12:30", "13:00～13:30"]))
            .await
            .unwrap()
            .expect("second label matches");

        assert_eq!(found.label, "13:00～13:30");
    }

    #[tokio::test]
    async fn reports_not_found() {
        let page = FakePage::new("https://example.test/entry", vec![FakeButton::new("戻る")]);

        let found = find_preferred_slot(&page, &labels(&["12:00～12:30"])).await.unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn alternative_scans_forward_only() {
        // anchor at index 3 of 6; 4 is not interactable, 5 is
        let page = FakePage::new(
            "https://example.test/entry",
            vec![
                FakeButton::new("10:30～11:00"),
                FakeButton::new("11:00～11:30"),
                FakeButton::new("11:30～12:00"),
                FakeButton::new("12:00～12:30").disabled(),
                FakeButton::new("12:30～13:00").no_pointer(),
                FakeButton::new("13:00～13:30"),
            ],
        );
        let anchor = find_preferred_slot(&page, &labels(&["12:00～12:30"]))
            .await
            .unwrap()
            .expect("anchor present")
            .button;

        let clicked = find_alternative(&page, &anchor).await.unwrap().expect("alternative");

        assert_eq!(clicked.index, 5);
        assert_eq!(page.clicks(), vec!["13:00～13:30".to_string()]);
    }

    #[tokio::test]
    async fn alternative_stays_inside_the_anchor_container() {
        let page = FakePage::new(
            "https://example.test/entry",
            vec![
                FakeButton::new("12:00～12:30").disabled().in_container(1),
                FakeButton::new("× 12:30～13:00").in_container(1),
                FakeButton::new("13:00～13:30").in_container(2),
            ],
        );
        let anchor = find_preferred_slot(&page, &labels(&["12:00～12:30"]))
            .await
            .unwrap()
            .expect("anchor present")
            .button;

        let clicked = find_alternative(&page, &anchor).await.unwrap();

        assert!(clicked.is_none());
        assert!(page.clicks().is_empty());
    }

    #[tokio::test]
    async fn last_button_in_container_has_no_alternative() {
        let page = FakePage::new(
            "https://example.test/entry",
            vec![
                FakeButton::new("11:30～12:00"),
                FakeButton::new("12:00～12:30").disabled(),
            ],
        );
        let anchor = find_preferred_slot(&page, &labels(&["12:00～12:30"]))
            .await
            .unwrap()
            .expect("anchor present")
            .button;

        assert!(find_alternative(&page, &anchor).await.unwrap().is_none());
        assert!(page.clicks().is_empty());
    }
}
