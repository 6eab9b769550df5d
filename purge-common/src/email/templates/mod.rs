use std::time::Duration;

pub struct VerificationCodeMessage {}

impl VerificationCodeMessage {
    pub fn subject(purpose: &str) -> &'static str {
        match purpose {
            "delete_account" => "Confirm your account deletion",
            "password_change" => "Confirm your password change",
            "revoke_sessions" => "Confirm signing out of all devices",
            _ => "Your verification code",
        }
    }

    pub fn generate(code: &str, purpose: &str, code_lifetime: Duration) -> String {
        let action = match purpose {
            "delete_account" => "permanently delete your account",
            "password_change" => "change your password",
            "revoke_sessions" => "sign out of all devices",
            _ => "continue",
        };

        format!(
            "<html>
               <head>
                 <style>
                   body {{
                     font-family: Arial, sans-serif;
                     text-align: center;
                   }}
                 </style>
               </head>
             <body>
               <h1>Verification Code</h1>
               <p>Use this code to {}.</p>
               <h2 style=\"font-family: 'Courier New', monospace; letter-spacing: 8px; \
               user-select: all; -webkit-user-select: all;\"><b>{}</b></h2>
               <p>We will never ask you for this code over the phone or email. \
               <b>Your code expires in {} minutes.</b></p>
               <p><i>Didn't request this? You can safely ignore this email.</i></p>
             </body>
             </html>",
            action,
            code,
            code_lifetime.as_secs() / 60,
        )
    }
}
