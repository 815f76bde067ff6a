//! Post and comment form binding and validation.
//!
//! Forms deserialize leniently (every field defaults to empty) so that a
//! missing field becomes a field error on the re-rendered page rather than a
//! rejected request.

use serde::Deserialize;

use crate::db::{Group, Post, PostInput};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

const IMAGE_EXTENSIONS: [&str; 5] = ["gif", "png", "jpg", "jpeg", "webp"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    /// Group id as submitted by the select box, empty for no group
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFormErrors {
    pub text: Vec<String>,
    pub group: Vec<String>,
    pub image: Vec<String>,
}

impl PostFormErrors {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.group.is_empty() && self.image.is_empty()
    }
}

/// One entry of the group select box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

impl PostForm {
    /// Prefill the form from a stored post, for editing.
    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post.group_id.map(|id| id.to_string()).unwrap_or_default(),
            image: post.image.clone().unwrap_or_default(),
        }
    }

    /// Validate against the groups that currently exist.
    pub fn clean(&self, groups: &[Group]) -> Result<PostInput, PostFormErrors> {
        let mut errors = PostFormErrors::default();

        let text = self.text.trim();
        if text.is_empty() {
            errors.text.push(REQUIRED.to_string());
        }

        let group_id = match self.group.trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(id) if groups.iter().any(|g| g.id == id) => Some(id),
                _ => {
                    errors.group.push(INVALID_CHOICE.to_string());
                    None
                }
            },
        };

        let image = match self.image.trim() {
            "" => None,
            raw if has_image_extension(raw) => Some(raw.to_string()),
            _ => {
                errors.image.push(INVALID_IMAGE.to_string());
                None
            }
        };

        if errors.is_empty() {
            Ok(PostInput {
                text: text.to_string(),
                group_id,
                image,
            })
        } else {
            Err(errors)
        }
    }

    pub fn group_options(&self, groups: &[Group]) -> Vec<GroupOption> {
        let selected = self.group.trim().parse::<i64>().ok();
        groups
            .iter()
            .map(|g| GroupOption {
                id: g.id,
                title: g.title.clone(),
                selected: selected == Some(g.id),
            })
            .collect()
    }
}

fn has_image_extension(reference: &str) -> bool {
    reference
        .rsplit_once('.')
        .map(|(stem, ext)| {
            !stem.is_empty()
                && IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    /// The trimmed comment text, or the field errors.
    pub fn clean(&self) -> Result<String, Vec<String>> {
        let text = self.text.trim();
        if text.is_empty() {
            Err(vec![REQUIRED.to_string()])
        } else {
            Ok(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> Vec<Group> {
        vec![
            Group {
                id: 1,
                title: "Test group".to_string(),
                slug: "test-slug".to_string(),
                description: String::new(),
            },
            Group {
                id: 2,
                title: "Empty group".to_string(),
                slug: "empty-slug".to_string(),
                description: String::new(),
            },
        ]
    }

    fn form(text: &str, group: &str, image: &str) -> PostForm {
        PostForm {
            text: text.to_string(),
            group: group.to_string(),
            image: image.to_string(),
        }
    }

    mod post_form_tests {
        use super::*;

        #[test]
        fn test_valid_full_submission() {
            let input = form("Some text", "1", "posts/small.gif")
                .clean(&groups())
                .unwrap();
            assert_eq!(input.text, "Some text");
            assert_eq!(input.group_id, Some(1));
            assert_eq!(input.image.as_deref(), Some("posts/small.gif"));
        }

        #[test]
        fn test_group_and_image_are_optional() {
            let input = form("Only text", "", "").clean(&groups()).unwrap();
            assert_eq!(input.group_id, None);
            assert_eq!(input.image, None);
        }

        #[test]
        fn test_text_is_trimmed() {
            let input = form("  padded \n", "", "").clean(&groups()).unwrap();
            assert_eq!(input.text, "padded");
        }

        #[test]
        fn test_blank_text_is_required() {
            let errors = form("   ", "", "").clean(&groups()).unwrap_err();
            assert_eq!(errors.text, vec![REQUIRED.to_string()]);
            assert!(errors.group.is_empty());
        }

        #[test]
        fn test_unknown_group_rejected() {
            let errors = form("text", "42", "").clean(&groups()).unwrap_err();
            assert_eq!(errors.group, vec![INVALID_CHOICE.to_string()]);
        }

        #[test]
        fn test_non_numeric_group_rejected() {
            let errors = form("text", "test-slug", "").clean(&groups()).unwrap_err();
            assert_eq!(errors.group.len(), 1);
        }

        #[test]
        fn test_non_image_rejected() {
            let errors = form("text", "", "notes.txt").clean(&groups()).unwrap_err();
            assert_eq!(errors.image, vec![INVALID_IMAGE.to_string()]);
        }

        #[test]
        fn test_all_errors_collected() {
            let errors = form("", "9", "x").clean(&groups()).unwrap_err();
            assert!(!errors.text.is_empty());
            assert!(!errors.group.is_empty());
            assert!(!errors.image.is_empty());
        }

        #[test]
        fn test_deserialize_missing_fields() {
            let parsed: PostForm = serde_urlencoded::from_str("text=hi").unwrap();
            assert_eq!(parsed.text, "hi");
            assert!(parsed.group.is_empty());
            assert!(parsed.image.is_empty());
        }
    }

    mod group_option_tests {
        use super::*;

        #[test]
        fn test_selected_option() {
            let options = form("", "2", "").group_options(&groups());
            assert_eq!(options.len(), 2);
            assert!(!options[0].selected);
            assert!(options[1].selected);
        }

        #[test]
        fn test_nothing_selected() {
            let options = form("", "", "").group_options(&groups());
            assert!(options.iter().all(|o| !o.selected));
        }
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension("a.GIF"));
        assert!(has_image_extension("https://example.com/pic.jpeg"));
        assert!(!has_image_extension(".png"));
        assert!(!has_image_extension("png"));
        assert!(!has_image_extension("archive.tar"));
    }

    mod comment_form_tests {
        use super::*;

        #[test]
        fn test_valid_comment() {
            let form = CommentForm {
                text: " Nice post ".to_string(),
            };
            assert_eq!(form.clean().unwrap(), "Nice post");
        }

        #[test]
        fn test_empty_comment() {
            let form = CommentForm::default();
            assert_eq!(form.clean().unwrap_err(), vec![REQUIRED.to_string()]);
        }
    }
}
