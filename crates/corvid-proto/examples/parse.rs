use corvid_proto::Message;

fn main() {
    for raw in [
        ":nick!user@host PRIVMSG #channel :Hello world!",
        ":irc.example.net 001 corvid :Welcome to the network",
        "PING :token",
        ":nick!user@host PRIVMSG #channel :\u{1}ACTION waves\u{1}",
    ] {
        let msg = Message::parse(raw);
        println!("{raw:?}");
        println!("  source:   {:?}", msg.source());
        println!("  command:  {:?}", msg.command);
        println!("  params:   {:?}", msg.params);
        println!("  trailing: {:?}", msg.trailing());
    }
}
