//! Raw protocol access: send an arbitrary line as the bot.

use std::sync::Arc;

use crate::bot::Bot;
use crate::hooks::{Hook, Outcome, Owner};
use crate::plugins::Plugin;

struct Raw;

pub fn construct(_bot: &Bot, _owner: Owner) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(Raw))
}

impl Plugin for Raw {
    fn hooks(&self) -> Vec<Hook> {
        vec![Hook::trigger("raw", |bot, _, _, rest| {
            bot.send(rest);
            Ok(Outcome::Handled)
        })
        .level(1000)]
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::hooks::dispatch;

    use super::*;

    fn bot() -> Bot {
        let config: Config = toml::from_str(
            r#"
            [network]
            host = "irc.test.invalid"

            [bot]
            nick = "corvid"
            superuser = "boss!*@*"
            "#,
        )
        .unwrap();
        let mut bot = Bot::new(config).unwrap();
        bot.load_plugin("raw").unwrap();
        bot
    }

    #[test]
    fn superuser_lines_pass_through_verbatim() {
        let mut bot = bot();
        dispatch::call_event(
            &mut bot,
            "recv",
            &[":boss!b@h PRIVMSG corvid :!raw PRIVMSG #x :spaced  out"],
        );
        assert_eq!(
            bot.out.pop_front().as_deref(),
            Some("PRIVMSG #x :spaced  out")
        );
    }

    #[test]
    fn strangers_cannot_speak_as_the_bot() {
        let mut bot = bot();
        dispatch::call_event(
            &mut bot,
            "recv",
            &[":guest!g@h PRIVMSG corvid :!raw QUIT :bye"],
        );
        let lines: Vec<String> = bot.out.drain(..).collect();
        assert_eq!(
            lines,
            vec!["PRIVMSG guest :You don't have permission to use that trigger"]
        );
    }
}
