//! Offline structural validation of a command stream: proves that
//! transform/clip/group depths are balanced inside every mask and matte
//! scope, and return to baseline by end of stream.

use crate::command::Command;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub command_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Depths {
    transform: i32,
    clip: i32,
    group: i32,
}

#[derive(Debug, Clone, Copy)]
struct OpenScope {
    begin_index: usize,
    kind: ScopeKind,
    depths_at_entry: Depths,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Mask,
    Matte,
}

/// Walks `commands` and returns every structural problem found, in
/// command-stream order. An empty result means the stream is well-formed.
pub fn validate(commands: &[Command]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut depths = Depths::default();
    let mut mask_depth = 0i32;
    let mut matte_depth = 0i32;
    let mut scopes: Vec<OpenScope> = Vec::new();

    for (index, command) in commands.iter().enumerate() {
        match command {
            Command::BeginGroup(_) => depths.group += 1,
            Command::EndGroup => {
                depths.group -= 1;
                if depths.group < 0 {
                    errors.push(ValidationError {
                        command_index: index,
                        message: "EndGroup with no matching BeginGroup".into(),
                    });
                    depths.group = 0;
                }
            }
            Command::PushTransform(_) => depths.transform += 1,
            Command::PopTransform => {
                depths.transform -= 1;
                if depths.transform < 0 {
                    errors.push(ValidationError {
                        command_index: index,
                        message: "PopTransform with no matching PushTransform".into(),
                    });
                    depths.transform = 0;
                }
            }
            Command::PushClipRect(_) => depths.clip += 1,
            Command::PopClipRect => {
                depths.clip -= 1;
                if depths.clip < 0 {
                    errors.push(ValidationError {
                        command_index: index,
                        message: "PopClipRect with no matching PushClipRect".into(),
                    });
                    depths.clip = 0;
                }
            }
            Command::BeginMask { .. } => {
                mask_depth += 1;
                scopes.push(OpenScope {
                    begin_index: index,
                    kind: ScopeKind::Mask,
                    depths_at_entry: depths,
                });
            }
            Command::EndMask => {
                mask_depth -= 1;
                if mask_depth < 0 {
                    errors.push(ValidationError {
                        command_index: index,
                        message: "EndMask with no matching BeginMask".into(),
                    });
                    mask_depth = 0;
                    continue;
                }
                close_scope(&mut scopes, ScopeKind::Mask, depths, index, &mut errors);
            }
            Command::BeginMatte(_) => {
                matte_depth += 1;
                scopes.push(OpenScope {
                    begin_index: index,
                    kind: ScopeKind::Matte,
                    depths_at_entry: depths,
                });
            }
            Command::EndMatte => {
                matte_depth -= 1;
                if matte_depth < 0 {
                    errors.push(ValidationError {
                        command_index: index,
                        message: "EndMatte with no matching BeginMatte".into(),
                    });
                    matte_depth = 0;
                    continue;
                }
                close_scope(&mut scopes, ScopeKind::Matte, depths, index, &mut errors);
            }
            Command::DrawImage { .. }
            | Command::DrawShape { .. }
            | Command::DrawStroke { .. } => {}
        }
    }

    for scope in scopes {
        let kind = match scope.kind {
            ScopeKind::Mask => "mask",
            ScopeKind::Matte => "matte",
        };
        errors.push(ValidationError {
            command_index: scope.begin_index,
            message: format!("unclosed {kind} scope"),
        });
    }

    if depths.transform != 0 {
        errors.push(ValidationError {
            command_index: commands.len(),
            message: format!("transform stack not balanced at end of stream ({} open)", depths.transform),
        });
    }
    if depths.clip != 0 {
        errors.push(ValidationError {
            command_index: commands.len(),
            message: format!("clip stack not balanced at end of stream ({} open)", depths.clip),
        });
    }
    if depths.group != 0 {
        errors.push(ValidationError {
            command_index: commands.len(),
            message: format!("group depth not balanced at end of stream ({} open)", depths.group),
        });
    }
    if mask_depth != 0 {
        errors.push(ValidationError {
            command_index: commands.len(),
            message: format!("mask depth not balanced at end of stream ({mask_depth} open)"),
        });
    }
    if matte_depth != 0 {
        errors.push(ValidationError {
            command_index: commands.len(),
            message: format!("matte depth not balanced at end of stream ({matte_depth} open)"),
        });
    }

    errors
}

fn close_scope(
    scopes: &mut Vec<OpenScope>,
    kind: ScopeKind,
    depths_at_exit: Depths,
    end_index: usize,
    errors: &mut Vec<ValidationError>,
) {
    // The matching Begin is the nearest still-open scope of this kind;
    // nested scopes of the other kind may also be open but the chain is
    // always well-nested by construction for a correctly emitted stream.
    let Some(pos) = scopes.iter().rposition(|s| s.kind == kind) else {
        return;
    };
    let scope = scopes.remove(pos);
    if scope.depths_at_entry != depths_at_exit {
        let kind_name = match kind {
            ScopeKind::Mask => "mask",
            ScopeKind::Matte => "matte",
        };
        errors.push(ValidationError {
            command_index: end_index,
            message: format!("cross-boundary transforms/clips in {kind_name} scope"),
        });
    }
}

/// Returns the `±window` command kind names around `index`, for debug-build
/// diagnostics.
pub fn diagnostic_window(commands: &[Command], index: usize, window: usize) -> Vec<(usize, &'static str)> {
    let start = index.saturating_sub(window);
    let end = (index + window + 1).min(commands.len());
    (start..end)
        .map(|i| (i, commands[i].kind_name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MaskMode, PathId};
    use crate::geom::Matrix2D;

    #[test]
    fn balanced_stream_has_no_errors() {
        let commands = vec![
            Command::BeginGroup("r".into()),
            Command::PushTransform(Matrix2D::IDENTITY),
            Command::PopTransform,
            Command::EndGroup,
        ];
        assert!(validate(&commands).is_empty());
    }

    #[test]
    fn pop_transform_below_zero_is_an_error() {
        let commands = vec![Command::PopTransform];
        let errors = validate(&commands);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("PopTransform"));
    }

    #[test]
    fn unbalanced_mask_at_end_is_an_error() {
        let commands = vec![Command::BeginMask {
            mode: MaskMode::Add,
            inverted: false,
            path: PathId(0),
            opacity: 1.0,
            frame: 0.0,
        }];
        let errors = validate(&commands);
        assert!(errors.iter().any(|e| e.message.contains("unclosed mask")));
    }

    #[test]
    fn cross_boundary_transform_in_mask_scope_is_detected() {
        // PushTransform, BeginMask, PopTransform, DrawShape, EndMask
        let commands = vec![
            Command::PushTransform(Matrix2D::IDENTITY),
            Command::BeginMask {
                mode: MaskMode::Add,
                inverted: false,
                path: PathId(0),
                opacity: 1.0,
                frame: 0.0,
            },
            Command::PopTransform,
            Command::DrawShape {
                path: PathId(0),
                fill_color: None,
                fill_opacity: 1.0,
                layer_opacity: 1.0,
                frame: 0.0,
            },
            Command::EndMask,
        ];
        let errors = validate(&commands);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].command_index, 4);
        assert!(errors[0]
            .message
            .contains("cross-boundary transforms/clips in mask scope"));
    }

    #[test]
    fn well_formed_mask_scope_with_balanced_inner_transform_is_clean() {
        let commands = vec![
            Command::BeginMask {
                mode: MaskMode::Add,
                inverted: false,
                path: PathId(0),
                opacity: 1.0,
                frame: 0.0,
            },
            Command::PushTransform(Matrix2D::IDENTITY),
            Command::PopTransform,
            Command::EndMask,
        ];
        assert!(validate(&commands).is_empty());
    }

    #[test]
    fn empty_stream_has_no_errors() {
        assert!(validate(&[]).is_empty());
    }
}
