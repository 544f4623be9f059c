#[cfg(test)]
#[path = "slash_commands_test.rs"]
mod tests;

pub struct SlashCommand {
    command: String,
    pub args: Vec<String>,
}

impl SlashCommand {
    pub fn parse(text: &str) -> Option<SlashCommand> {
        let mut args = text
            .trim()
            .split(' ')
            .filter(|e| return !e.is_empty())
            .map(|e| return e.to_string())
            .collect::<Vec<String>>();
        if args.is_empty() {
            return None;
        }
        let prefix = args.remove(0);

        let cmd = SlashCommand {
            command: prefix,
            args,
        };
        if cmd.is_quit()
            || cmd.is_help()
            || cmd.is_retry()
            || cmd.is_stop()
            || cmd.is_clear()
            || cmd.is_search()
            || cmd.is_logout()
            || cmd.is_image()
        {
            return Some(cmd);
        }

        return None;
    }

    pub fn is_quit(&self) -> bool {
        return ["/q", "/quit", "/exit"].contains(&self.command.as_str());
    }

    pub fn is_help(&self) -> bool {
        return ["/h", "/help"].contains(&self.command.as_str());
    }

    pub fn is_retry(&self) -> bool {
        return ["/r", "/retry"].contains(&self.command.as_str());
    }

    pub fn is_stop(&self) -> bool {
        return ["/s", "/stop"].contains(&self.command.as_str());
    }

    pub fn is_clear(&self) -> bool {
        return ["/c", "/clear"].contains(&self.command.as_str());
    }

    pub fn is_search(&self) -> bool {
        return ["/search"].contains(&self.command.as_str());
    }

    pub fn is_logout(&self) -> bool {
        return ["/logout"].contains(&self.command.as_str());
    }

    /// `/image PATH [PROMPT...]` attaches a local image to the next message.
    pub fn is_image(&self) -> bool {
        return ["/i", "/image"].contains(&self.command.as_str()) && !self.args.is_empty();
    }
}
