use crate::commands::{auth, comments, posts, profile};

#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub struct CommandExample {
    pub name: &'static str,
    pub groups: &'static [ExampleGroup],
}

pub fn command_examples() -> &'static [CommandExample] {
    &[
        CommandExample {
            name: "auth",
            groups: auth::EXAMPLES,
        },
        CommandExample {
            name: "posts",
            groups: posts::EXAMPLES,
        },
        CommandExample {
            name: "comments",
            groups: comments::EXAMPLES,
        },
        CommandExample {
            name: "profile",
            groups: profile::EXAMPLES,
        },
    ]
}
