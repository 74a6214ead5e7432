#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SettingsCommandSpec {
    pub command: &'static str,
    pub key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "pose",
        action: "select_pose",
    },
    CommandSpec {
        command: "remove",
        action: "remove_clothing",
    },
];

pub(crate) const SETTINGS_COMMANDS: &[SettingsCommandSpec] = &[
    SettingsCommandSpec {
        command: "angle",
        key: "camera_angle",
    },
    SettingsCommandSpec {
        command: "resolution",
        key: "resolution",
    },
    SettingsCommandSpec {
        command: "ratio",
        key: "aspect_ratio",
    },
    SettingsCommandSpec {
        command: "style",
        key: "style_prompt",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "photo",
        action: "attach_photo",
    },
    CommandSpec {
        command: "save",
        action: "save_look",
    },
];

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "add",
    action: "add_clothing",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "next",
        action: "next_step",
    },
    CommandSpec {
        command: "back",
        action: "back_step",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "poses",
        action: "list_poses",
    },
    CommandSpec {
        command: "new",
        action: "new_session",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub const WIZARD_HELP_COMMANDS: &[&str] = &[
    "/poses",
    "/pose",
    "/photo",
    "/generate",
    "/add",
    "/remove",
    "/next",
    "/back",
    "/angle",
    "/resolution",
    "/ratio",
    "/style",
    "/status",
    "/save",
    "/new",
    "/help",
    "/quit",
];
